use super::Camera;
use crate::error::CaptureError;
use crate::frame::{Frame, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::trace;

/// Synthetic camera drawing a scrolling gradient.
///
/// A colored marker can be painted in the center so the color-match
/// recognizer has something to find.
pub struct TestPatternCamera {
    width: u32,
    height: u32,
    frame_counter: AtomicU64,
    marker: Mutex<Option<[u8; 3]>>,
}

impl TestPatternCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_counter: AtomicU64::new(0),
            marker: Mutex::new(None),
        }
    }

    pub fn set_marker(&self, color: Option<[u8; 3]>) {
        *self.marker.lock() = color;
    }

    pub fn marker(&self) -> Option<[u8; 3]> {
        *self.marker.lock()
    }

    /// Next live preview frame
    pub fn preview_frame(&self) -> Frame {
        let id = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        let marker = self.marker();
        let (w, h) = (self.width as usize, self.height as usize);
        let shift = (id * 4) as usize;

        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                let in_marker = marker.is_some()
                    && x >= w / 3
                    && x < w - w / 3
                    && y >= h / 3
                    && y < h - h / 3;
                match marker {
                    Some(color) if in_marker => data.extend_from_slice(&color),
                    _ => {
                        let v = (((x + shift) * 255) / w.max(1)) as u8;
                        data.extend_from_slice(&[v, (y * 255 / h.max(1)) as u8, 255 - v]);
                    }
                }
            }
        }

        trace!("Generated test pattern frame {}", id);
        Frame::new(
            id,
            SystemTime::now(),
            data,
            self.width,
            self.height,
            FrameFormat::Rgb24,
        )
    }
}

#[async_trait]
impl Camera for TestPatternCamera {
    async fn capture_photo(&self) -> Result<Frame, CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::Unavailable);
        }
        Ok(self.preview_frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_produces_valid_frames() {
        let camera = TestPatternCamera::new(16, 12);
        let first = camera.capture_photo().await.unwrap();
        let second = camera.capture_photo().await.unwrap();

        assert!(first.validate_size());
        assert_eq!(second.id, first.id + 1);
    }

    #[test]
    fn test_marker_paints_center() {
        let camera = TestPatternCamera::new(9, 9);
        camera.set_marker(Some([220, 30, 30]));
        let frame = camera.preview_frame();

        assert_eq!(frame.pixel_rgb(4, 4), Some([220, 30, 30]));
        assert_ne!(frame.pixel_rgb(0, 0), Some([220, 30, 30]));
    }

    #[tokio::test]
    async fn test_zero_sized_camera_is_unavailable() {
        let camera = TestPatternCamera::new(0, 0);
        assert!(matches!(
            camera.capture_photo().await,
            Err(CaptureError::Unavailable)
        ));
    }
}
