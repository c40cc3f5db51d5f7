//! Decoded frames and the pixel buffers they carry.
//!
//! - `Frame`: one decoded RGB image plus its source index and capture instant.
//! - `Publication`: one frame and its detections handed from the worker to the UI.
//!
//! Frames move by value between stages. A stage that needs to keep a frame while
//! handing it on clones it, so no pixel buffer is ever mutated from two threads.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::time::Instant;

use crate::detect::Detection;

/// One decoded image from a source.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Zero-based position of this frame within its source.
    pub index: u64,
    /// Monotonic capture instant.
    pub captured_at: Instant,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            captured_at: Instant::now(),
            image,
        }
    }

    /// Build a frame from tightly packed RGB24 bytes.
    pub fn from_rgb(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("pixel buffer does not match {}x{}", width, height))?;
        Ok(Self::new(index, image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// One (frame, detections) unit handed from the worker to the presentation layer.
#[derive(Clone, Debug)]
pub struct Publication {
    /// Strictly increasing within a session.
    pub sequence: u64,
    pub frame: Frame,
    pub detections: Vec<Detection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_checks_buffer_length() {
        assert!(Frame::from_rgb(0, 4, 4, vec![0u8; 4 * 4 * 3]).is_ok());
        assert!(Frame::from_rgb(0, 4, 4, vec![0u8; 10]).is_err());
    }

    #[test]
    fn clones_do_not_share_pixels() {
        let frame = Frame::from_rgb(3, 2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let mut image = frame.clone().into_image();
        image.put_pixel(0, 0, image::Rgb([9, 9, 9]));
        assert_eq!(frame.image().get_pixel(0, 0).0, [1, 2, 3]);
        assert_eq!(frame.index, 3);
        assert_eq!((frame.width(), frame.height()), (2, 1));
    }
}
