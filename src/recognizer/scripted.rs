use super::Detector;
use crate::error::RecognizerError;
use crate::frame::Frame;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Script {
    presented: Option<String>,
    failures: usize,
}

/// Remote control for a [`ScriptedDetector`]: whatever is presented here is
/// "seen" in every processed frame until hidden.
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
}

impl ScriptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a code carrying `payload` to the camera
    pub fn present(&self, payload: impl Into<String>) {
        self.script.lock().presented = Some(payload.into());
    }

    /// Take the code out of view
    pub fn hide(&self) {
        self.script.lock().presented = None;
    }

    /// Make the next `frames` detections fail as decode errors
    pub fn fail_next(&self, frames: usize) {
        self.script.lock().failures = frames;
    }

    pub fn presented(&self) -> Option<String> {
        self.script.lock().presented.clone()
    }

    /// A detector driven by this handle
    pub fn detector(&self) -> ScriptedDetector {
        ScriptedDetector {
            handle: self.clone(),
        }
    }
}

/// Detector whose answers come from a [`ScriptHandle`] instead of pixels.
pub struct ScriptedDetector {
    handle: ScriptHandle,
}

impl ScriptedDetector {
    pub fn new() -> (Self, ScriptHandle) {
        let handle = ScriptHandle::new();
        (handle.detector(), handle)
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Option<String>, RecognizerError> {
        let mut script = self.handle.script.lock();
        if script.failures > 0 {
            script.failures -= 1;
            return Err(RecognizerError::Decode {
                details: "scripted failure".to_string(),
            });
        }
        Ok(script.presented.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_detection_follows_handle() {
        let (mut detector, handle) = ScriptedDetector::new();
        let frame = Frame::solid(1, 1, 1, [0, 0, 0]);

        assert_eq!(detector.detect(&frame).unwrap(), None);
        handle.present("back");
        assert_eq!(detector.detect(&frame).unwrap(), Some("back".to_string()));

        handle.fail_next(1);
        assert!(detector.detect(&frame).is_err());
        assert_eq!(detector.detect(&frame).unwrap(), Some("back".to_string()));

        handle.hide();
        assert_eq!(detector.detect(&frame).unwrap(), None);
    }
}
