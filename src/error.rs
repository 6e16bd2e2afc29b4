use crate::recognizer::RecognizerKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StopmoError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Frame store error: {0}")]
    Store(#[from] StoreError),

    #[error("Recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl StopmoError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Frame store is full ({len}/{capacity}), cannot add {requested} more")]
    CapacityExceeded {
        capacity: usize,
        len: usize,
        requested: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognizerError {
    #[error("Decode failed: {details}")]
    Decode { details: String },

    #[error("Unsupported frame format: {details}")]
    UnsupportedFormat { details: String },

    #[error("Recognizer {0:?} is not available")]
    Unavailable(RecognizerKind),
}

#[derive(Error, Debug, Clone)]
pub enum CaptureError {
    #[error("Camera unavailable")]
    Unavailable,

    #[error("Capture failed: {details}")]
    Failed { details: String },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Nothing to export")]
    EmptySequence,

    #[error("Encoding failed: {details}")]
    Encode { details: String },

    #[error("Export IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export is not supported in this build")]
    Unsupported,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No upload destination configured")]
    NoDestination,

    #[error("Upload request failed: {details}")]
    Request { details: String },

    #[error("Upload rejected with HTTP status {status}")]
    Status { status: u16 },

    #[error("Upload IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, StopmoError>;
