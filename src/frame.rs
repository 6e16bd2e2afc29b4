use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 8-bit RGB, 3 bytes per pixel
    Rgb24,
    /// 8-bit RGBA, 4 bytes per pixel
    Rgba32,
    /// 8-bit luminance
    Gray8,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Rgb24 => 3,
            FrameFormat::Rgba32 => 4,
            FrameFormat::Gray8 => 1,
        }
    }
}

/// A captured image. Pixel data is shared and never mutated after capture,
/// so cloning a frame is cheap.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame identifier, restamped by the frame store on insertion
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw pixel data
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: FrameFormat,
}

impl Frame {
    /// Create a new frame
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Create an RGB frame filled with a single color
    pub fn solid(id: u64, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(id, SystemTime::now(), data, width, height, FrameFormat::Rgb24)
    }

    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Copy of this frame carrying a different id. The pixel buffer is shared.
    pub fn duplicate(&self, id: u64) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }

    /// RGB value at a pixel, `None` when out of bounds or the buffer is short
    pub fn pixel_rgb(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        let px = self.data.get(offset..offset + bpp)?;
        Some(match self.format {
            FrameFormat::Rgb24 | FrameFormat::Rgba32 => [px[0], px[1], px[2]],
            FrameFormat::Gray8 => [px[0], px[0], px[0]],
        })
    }

    /// Convert to RGBA with `crop_top` and `crop_bottom` rows removed.
    ///
    /// Returns the new height and pixel data, or `None` if the crop leaves
    /// nothing or the buffer does not match the declared size.
    pub fn cropped_rgba(&self, crop_top: u32, crop_bottom: u32) -> Option<(u32, Vec<u8>)> {
        if !self.validate_size() || crop_top + crop_bottom >= self.height {
            return None;
        }
        let height = self.height - crop_top - crop_bottom;
        let mut out = Vec::with_capacity(self.width as usize * height as usize * 4);
        for y in crop_top..crop_top + height {
            for x in 0..self.width {
                let [r, g, b] = self.pixel_rgb(x, y)?;
                let a = match self.format {
                    FrameFormat::Rgba32 => {
                        let offset = (y as usize * self.width as usize + x as usize) * 4;
                        self.data[offset + 3]
                    }
                    _ => 255,
                };
                out.extend_from_slice(&[r, g, b, a]);
            }
        }
        Some((height, out))
    }
}
