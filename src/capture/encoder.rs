//! JPEG encoding of published frames

use anyhow::{Context, Result};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;

use super::{Frame, FrameEncoder};

/// Default JPEG quality for the live feed
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &Frame) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(64 * 1024);
        JpegEncoder::new_with_quality(&mut buf, self.quality)
            .encode_image(&frame.image)
            .context("Failed to encode frame as JPEG")?;
        Ok(Bytes::from(buf))
    }
}
