mod color;
mod scripted;
mod tracker;

pub use color::ColorMatchDetector;
pub use scripted::{ScriptHandle, ScriptedDetector};
pub use tracker::DetectionTracker;

use crate::config::StopmoConfig;
use crate::error::RecognizerError;
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Recognition techniques that can drive the command router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerKind {
    QrCode,
    Barcode,
    ColorMatch,
    /// Payloads supplied by hand (keyboard, tests)
    Manual,
}

impl RecognizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognizerKind::QrCode => "qr_code",
            RecognizerKind::Barcode => "barcode",
            RecognizerKind::ColorMatch => "color_match",
            RecognizerKind::Manual => "manual",
        }
    }
}

/// Per-frame detector. Implementations only answer "is a target visible in
/// this frame, and what does it say"; run tracking is done by [`Recognizer`].
pub trait Detector: Send {
    /// Returns the payload of a visible target, `Some("")` for a target
    /// without data, or `None` when nothing is visible.
    fn detect(&mut self, frame: &Frame) -> Result<Option<String>, RecognizerError>;

    /// Clear any state carried between frames
    fn reset(&mut self) {}
}

/// Detection state transitions delivered to the command router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerSignal {
    TargetAcquired,
    DataDetected(String),
    TargetLost,
}

/// The active recognizer: a detector plus the tracker that turns its
/// per-frame answers into acquired/data/lost signals.
pub struct Recognizer {
    kind: RecognizerKind,
    detector: Box<dyn Detector>,
    tracker: DetectionTracker,
}

impl Recognizer {
    pub fn new(kind: RecognizerKind, detector: Box<dyn Detector>, lost_after_misses: u32) -> Self {
        Self {
            kind,
            detector,
            tracker: DetectionTracker::new(lost_after_misses),
        }
    }

    pub fn kind(&self) -> RecognizerKind {
        self.kind
    }

    pub fn is_detecting(&self) -> bool {
        self.tracker.is_detecting()
    }

    /// Run detection on one frame. Detector errors count as "nothing seen".
    pub fn process_frame(&mut self, frame: &Frame) -> Vec<RecognizerSignal> {
        let detection = match self.detector.detect(frame) {
            Ok(detection) => detection,
            Err(e) => {
                trace!("{} detector error on frame {}: {}", self.kind.as_str(), frame.id, e);
                None
            }
        };
        self.tracker.observe(detection)
    }

    pub fn reset(&mut self) {
        debug!("Resetting {} recognizer", self.kind.as_str());
        self.detector.reset();
        self.tracker.reset();
    }
}

type DetectorFactory = Arc<dyn Fn(&StopmoConfig) -> Box<dyn Detector> + Send + Sync>;

/// Maps recognizer kinds to detector constructors.
///
/// Color matching is built in; QR and barcode decoders are registered by
/// the embedding application.
#[derive(Clone)]
pub struct DetectorRegistry {
    factories: HashMap<RecognizerKind, DetectorFactory>,
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(RecognizerKind::ColorMatch, |config| {
            Box::new(ColorMatchDetector::new(config.color.clone()))
        });
        registry
    }
}

impl DetectorRegistry {
    pub fn register<F>(&mut self, kind: RecognizerKind, factory: F)
    where
        F: Fn(&StopmoConfig) -> Box<dyn Detector> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
    }

    pub fn supports(&self, kind: RecognizerKind) -> bool {
        self.factories.contains_key(&kind)
    }

    pub fn build(
        &self,
        kind: RecognizerKind,
        config: &StopmoConfig,
    ) -> Result<Recognizer, RecognizerError> {
        let factory = self
            .factories
            .get(&kind)
            .ok_or(RecognizerError::Unavailable(kind))?;
        Ok(Recognizer::new(
            kind,
            factory(config),
            config.recognition.lost_after_misses,
        ))
    }
}
