pub mod app;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod keyboard_input;
pub mod playback;
pub mod recognizer;
pub mod router;
pub mod store;

pub use app::{ShutdownReason, Studio};
pub use collaborators::{
    Camera, Collaborators, ExportOptions, Exporter, Feedback, LogFeedback, TestPatternCamera,
    Uploader, VideoArtifact,
};
pub use config::{SettingsHandle, StopmoConfig};
pub use error::{Result, StopmoError};
pub use events::{Effect, EventBus, EventFilter, EventReceiver, StopmoEvent};
pub use frame::{Frame, FrameFormat};
pub use playback::{next_index, PlayDirection, PlaybackEngine, PlaybackStatus};
pub use recognizer::{
    Detector, DetectorRegistry, Recognizer, RecognizerKind, RecognizerSignal, ScriptHandle,
    ScriptedDetector,
};
pub use router::{CaptureKind, Command, Mode, RouterHandle, RouterSnapshot};
pub use store::FrameStore;
