//! Outbound side effects of the command router: camera captures, film
//! export, upload and audio cues. The router only depends on these traits.

mod camera;
#[cfg(feature = "gif_export")]
mod export;
mod feedback;
#[cfg(feature = "upload")]
mod upload;

pub use camera::TestPatternCamera;
#[cfg(feature = "gif_export")]
pub use export::GifExporter;
pub use feedback::LogFeedback;
#[cfg(feature = "upload")]
pub use upload::HttpUploader;

use crate::config::StopmoConfig;
use crate::error::{CaptureError, ExportError, UploadError};
use crate::frame::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Produces still captures from the current camera state
#[async_trait]
pub trait Camera: Send + Sync {
    async fn capture_photo(&self) -> Result<Frame, CaptureError>;
}

/// Options applied when a frame sequence is exported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    pub frame_rate: u32,
    pub crop_top: u32,
    pub crop_bottom: u32,
    pub reverse: bool,
}

impl ExportOptions {
    pub fn from_config(config: &StopmoConfig) -> Self {
        Self {
            frame_rate: config.playback.frame_rate,
            crop_top: config.export.crop_top,
            crop_bottom: config.export.crop_bottom,
            reverse: config.playback.reverse,
        }
    }
}

/// An exported film on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub path: PathBuf,
    pub frame_count: usize,
    pub content_type: String,
}

#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export_video(
        &self,
        frames: Vec<Frame>,
        options: ExportOptions,
    ) -> Result<VideoArtifact, ExportError>;
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload_video(
        &self,
        artifact: &VideoArtifact,
        destination: &str,
    ) -> Result<(), UploadError>;
}

/// Audio/haptic cues. Calls must return quickly.
pub trait Feedback: Send + Sync {
    /// Continuous cue while a command code is in view
    fn start_hum(&self);
    fn stop_hum(&self);
    /// Capture cue
    fn shutter(&self);
    /// Silence everything
    fn reset(&self);
}

/// Everything the router reaches outside the core
#[derive(Clone)]
pub struct Collaborators {
    pub camera: Arc<dyn Camera>,
    pub exporter: Arc<dyn Exporter>,
    pub uploader: Arc<dyn Uploader>,
    pub feedback: Arc<dyn Feedback>,
}

/// Exporter used when the crate is built without an encoder
pub struct NoExport;

#[async_trait]
impl Exporter for NoExport {
    async fn export_video(
        &self,
        _frames: Vec<Frame>,
        _options: ExportOptions,
    ) -> Result<VideoArtifact, ExportError> {
        Err(ExportError::Unsupported)
    }
}

/// Uploader used when the crate is built without an HTTP client
pub struct NoUpload;

#[async_trait]
impl Uploader for NoUpload {
    async fn upload_video(
        &self,
        _artifact: &VideoArtifact,
        _destination: &str,
    ) -> Result<(), UploadError> {
        Err(UploadError::Request {
            details: "upload support not compiled in".to_string(),
        })
    }
}
