use super::{Uploader, VideoArtifact};
use crate::error::UploadError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// POSTs exported films to an HTTP endpoint
pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    pub fn new(timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Request {
                details: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload_video(
        &self,
        artifact: &VideoArtifact,
        destination: &str,
    ) -> Result<(), UploadError> {
        if destination.trim().is_empty() {
            return Err(UploadError::NoDestination);
        }

        let body = tokio::fs::read(&artifact.path).await?;
        let file_name = artifact
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Uploading {} bytes to {}", body.len(), destination);

        let response = self
            .client
            .post(destination)
            .header("Content-Type", artifact.content_type.as_str())
            .header("X-Film-Name", file_name)
            .header("X-Film-Frames", artifact.frame_count.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Request {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status {
                status: status.as_u16(),
            });
        }

        info!("Uploaded {} to {}", artifact.path.display(), destination);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_blank_destination_is_rejected() {
        let uploader = HttpUploader::new(Duration::from_secs(1)).unwrap();
        let artifact = VideoArtifact {
            path: PathBuf::from("missing.gif"),
            frame_count: 1,
            content_type: "image/gif".to_string(),
        };

        assert!(matches!(
            uploader.upload_video(&artifact, "  ").await,
            Err(UploadError::NoDestination)
        ));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_an_io_error() {
        let uploader = HttpUploader::new(Duration::from_secs(1)).unwrap();
        let artifact = VideoArtifact {
            path: PathBuf::from("/nonexistent/film.gif"),
            frame_count: 1,
            content_type: "image/gif".to_string(),
        };

        assert!(matches!(
            uploader.upload_video(&artifact, "http://127.0.0.1:9/films").await,
            Err(UploadError::Io(_))
        ));
    }
}
