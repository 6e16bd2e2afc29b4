use super::Detector;
use crate::config::ColorMatchConfig;
use crate::error::RecognizerError;
use crate::frame::Frame;

/// Detects a target color in a centered sample window.
///
/// The window's average RGB is compared with the configured target; a
/// match reports the configured payload.
pub struct ColorMatchDetector {
    config: ColorMatchConfig,
}

impl ColorMatchDetector {
    pub fn new(config: ColorMatchConfig) -> Self {
        Self { config }
    }

    fn average_center(&self, frame: &Frame) -> Result<[f32; 3], RecognizerError> {
        if !frame.validate_size() || frame.width == 0 || frame.height == 0 {
            return Err(RecognizerError::UnsupportedFormat {
                details: format!(
                    "{}x{} {:?} frame with {} bytes",
                    frame.width,
                    frame.height,
                    frame.format,
                    frame.data.len()
                ),
            });
        }

        let fraction = self.config.sample_fraction.clamp(0.01, 1.0);
        let win_w = ((frame.width as f32 * fraction) as u32).max(1);
        let win_h = ((frame.height as f32 * fraction) as u32).max(1);
        let x0 = (frame.width - win_w) / 2;
        let y0 = (frame.height - win_h) / 2;

        let mut sum = [0u64; 3];
        for y in y0..y0 + win_h {
            for x in x0..x0 + win_w {
                if let Some(px) = frame.pixel_rgb(x, y) {
                    for (acc, v) in sum.iter_mut().zip(px) {
                        *acc += v as u64;
                    }
                }
            }
        }

        let count = (win_w * win_h) as f32;
        Ok(sum.map(|s| s as f32 / count))
    }
}

impl Detector for ColorMatchDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<String>, RecognizerError> {
        let average = self.average_center(frame)?;
        let (r, g, b) = self.config.target;
        let distance = average
            .iter()
            .zip([r, g, b])
            .map(|(a, t)| (a - t as f32).powi(2))
            .sum::<f32>()
            .sqrt();

        if distance <= self.config.tolerance {
            Ok(Some(self.config.payload.clone()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameFormat;
    use std::time::SystemTime;

    fn config() -> ColorMatchConfig {
        ColorMatchConfig {
            target: (220, 30, 30),
            tolerance: 40.0,
            sample_fraction: 0.5,
            payload: "snap".to_string(),
        }
    }

    #[test]
    fn test_matching_color_reports_payload() {
        let mut detector = ColorMatchDetector::new(config());
        let frame = Frame::solid(1, 8, 8, [210, 40, 25]);
        assert_eq!(detector.detect(&frame).unwrap(), Some("snap".to_string()));
    }

    #[test]
    fn test_other_color_is_ignored() {
        let mut detector = ColorMatchDetector::new(config());
        let frame = Frame::solid(1, 8, 8, [20, 200, 30]);
        assert_eq!(detector.detect(&frame).unwrap(), None);
    }

    #[test]
    fn test_only_center_window_counts() {
        let mut detector = ColorMatchDetector::new(config());
        // Green frame with a red 4x4 center patch
        let mut data = Vec::new();
        for y in 0..8 {
            for x in 0..8 {
                if (2..6).contains(&x) && (2..6).contains(&y) {
                    data.extend_from_slice(&[220, 30, 30]);
                } else {
                    data.extend_from_slice(&[0, 255, 0]);
                }
            }
        }
        let frame = Frame::new(1, SystemTime::now(), data, 8, 8, FrameFormat::Rgb24);
        assert_eq!(detector.detect(&frame).unwrap(), Some("snap".to_string()));
    }

    #[test]
    fn test_short_buffer_is_an_error() {
        let mut detector = ColorMatchDetector::new(config());
        let frame = Frame::new(1, SystemTime::now(), vec![0; 5], 8, 8, FrameFormat::Rgb24);
        assert!(detector.detect(&frame).is_err());
    }
}
