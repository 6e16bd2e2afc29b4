use super::RecognizerSignal;

/// Turns per-frame detections into a run-based signal stream.
///
/// Per continuous run: `TargetAcquired` once, `DataDetected` whenever the
/// payload changes (the first payload is delivered just before
/// `TargetAcquired`), and exactly one `TargetLost` after
/// `lost_after_misses` consecutive empty frames.
#[derive(Debug)]
pub struct DetectionTracker {
    lost_after_misses: u32,
    detecting: bool,
    misses: u32,
    last_payload: Option<String>,
}

impl DetectionTracker {
    pub fn new(lost_after_misses: u32) -> Self {
        Self {
            lost_after_misses: lost_after_misses.max(1),
            detecting: false,
            misses: 0,
            last_payload: None,
        }
    }

    pub fn is_detecting(&self) -> bool {
        self.detecting
    }

    pub fn observe(&mut self, detection: Option<String>) -> Vec<RecognizerSignal> {
        let mut signals = Vec::new();
        match detection {
            Some(payload) => {
                self.misses = 0;
                let changed = self.last_payload.as_deref() != Some(payload.as_str());
                if changed && !payload.is_empty() {
                    signals.push(RecognizerSignal::DataDetected(payload.clone()));
                }
                if changed {
                    self.last_payload = Some(payload);
                }
                if !self.detecting {
                    self.detecting = true;
                    signals.push(RecognizerSignal::TargetAcquired);
                }
            }
            None if self.detecting => {
                self.misses += 1;
                if self.misses >= self.lost_after_misses {
                    self.detecting = false;
                    self.misses = 0;
                    self.last_payload = None;
                    signals.push(RecognizerSignal::TargetLost);
                }
            }
            None => {}
        }
        signals
    }

    pub fn reset(&mut self) {
        self.detecting = false;
        self.misses = 0;
        self.last_payload = None;
    }
}
