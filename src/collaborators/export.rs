use super::{ExportOptions, Exporter, VideoArtifact};
use crate::error::ExportError;
use crate::frame::Frame;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

/// Sidecar written next to every exported film
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilmManifest {
    pub film: String,
    pub created_at: DateTime<Local>,
    pub frame_count: usize,
    pub frame_ids: Vec<u64>,
    pub options: ExportOptions,
}

/// Encodes films as looping animated GIFs
pub struct GifExporter {
    output_dir: PathBuf,
}

impl GifExporter {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn film_name(created_at: &DateTime<Local>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("film-{}-{}", created_at.format("%Y%m%d-%H%M%S"), &suffix[..8])
    }
}

fn encode_gif(path: &Path, frames: &[Frame], options: &ExportOptions) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| ExportError::Encode {
            details: e.to_string(),
        })?;

    let delay = Delay::from_numer_denom_ms(1000, options.frame_rate.max(1));
    for frame in frames {
        let (height, rgba) = frame
            .cropped_rgba(options.crop_top, options.crop_bottom)
            .ok_or_else(|| ExportError::Encode {
                details: format!("frame {} cannot be cropped to a valid image", frame.id),
            })?;
        let image = RgbaImage::from_raw(frame.width, height, rgba).ok_or_else(|| {
            ExportError::Encode {
                details: format!("frame {} has an inconsistent buffer", frame.id),
            }
        })?;
        encoder
            .encode_frame(image::Frame::from_parts(image, 0, 0, delay))
            .map_err(|e| ExportError::Encode {
                details: e.to_string(),
            })?;
    }
    Ok(())
}

#[async_trait]
impl Exporter for GifExporter {
    async fn export_video(
        &self,
        mut frames: Vec<Frame>,
        options: ExportOptions,
    ) -> Result<VideoArtifact, ExportError> {
        if frames.is_empty() {
            return Err(ExportError::EmptySequence);
        }
        if options.reverse {
            frames.reverse();
        }

        fs::create_dir_all(&self.output_dir).await?;

        let created_at = Local::now();
        let name = Self::film_name(&created_at);
        let gif_path = self.output_dir.join(format!("{}.gif", name));
        let manifest = FilmManifest {
            film: name.clone(),
            created_at,
            frame_count: frames.len(),
            frame_ids: frames.iter().map(|f| f.id).collect(),
            options,
        };

        debug!("Encoding {} frames to {}", frames.len(), gif_path.display());
        let encode_path = gif_path.clone();
        tokio::task::spawn_blocking(move || encode_gif(&encode_path, &frames, &options))
            .await
            .map_err(|e| ExportError::Encode {
                details: format!("encoder task failed: {}", e),
            })??;

        let manifest_json =
            serde_json::to_string_pretty(&manifest).map_err(|e| ExportError::Encode {
                details: format!("Failed to serialize manifest: {}", e),
            })?;
        fs::write(self.output_dir.join(format!("{}.json", name)), manifest_json).await?;

        info!("Exported film {} ({} frames)", gif_path.display(), manifest.frame_count);
        Ok(VideoArtifact {
            path: gif_path,
            frame_count: manifest.frame_count,
            content_type: "image/gif".to_string(),
        })
    }
}
