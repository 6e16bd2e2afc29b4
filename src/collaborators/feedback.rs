use super::Feedback;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

/// Feedback that reports cues through the log instead of a speaker
#[derive(Debug, Default)]
pub struct LogFeedback {
    humming: AtomicBool,
    shutters: AtomicU64,
}

impl LogFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_humming(&self) -> bool {
        self.humming.load(Ordering::Relaxed)
    }

    pub fn shutter_count(&self) -> u64 {
        self.shutters.load(Ordering::Relaxed)
    }
}

impl Feedback for LogFeedback {
    fn start_hum(&self) {
        if !self.humming.swap(true, Ordering::Relaxed) {
            debug!("Hum started");
        }
    }

    fn stop_hum(&self) {
        if self.humming.swap(false, Ordering::Relaxed) {
            debug!("Hum stopped");
        }
    }

    fn shutter(&self) {
        let count = self.shutters.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Click! (shutter #{})", count);
    }

    fn reset(&self) {
        self.humming.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hum_state_tracks_calls() {
        let feedback = LogFeedback::new();
        feedback.start_hum();
        feedback.start_hum();
        assert!(feedback.is_humming());

        feedback.reset();
        assert!(!feedback.is_humming());

        feedback.shutter();
        assert_eq!(feedback.shutter_count(), 1);
    }
}
