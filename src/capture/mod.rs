//! Capture pipeline - camera, vision collaborators and the capture loop
//!
//! Everything in here runs on the dedicated capture thread. The traits are
//! blocking on purpose: camera reads, barcode decoding and OCR may take as long
//! as the device or algorithm needs without ever stalling an HTTP handler.
//!
//! Bundled implementations ([`ReplayCameraProvider`], [`SidecarVision`],
//! [`JpegFrameEncoder`]) let the gateway run from a directory of recorded
//! frames; live camera / zbar / tesseract backends plug in through the same
//! traits.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::CaptureError;

pub mod encoder;
pub(crate) mod font;
#[cfg(test)]
pub(crate) mod fakes;
pub mod overlay;
pub mod photos;
pub mod replay;
pub(crate) mod runner;
pub mod sidecar;

pub use encoder::JpegFrameEncoder;
pub use photos::{PhotoSink, PhotoStats};
pub use replay::ReplayCameraProvider;
pub use sidecar::SidecarVision;

/// One captured camera frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
    /// File the frame was replayed from, if any
    pub source: Option<PathBuf>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
            source: None,
        }
    }
}

/// Axis-aligned pixel rectangle, `[x, y, w, h]` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "[u32; 4]")]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersect with a `width` x `height` image, `None` if nothing is left
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(Rect::new(self.x, self.y, w, h))
    }
}

impl From<[u32; 4]> for Rect {
    fn from([x, y, width, height]: [u32; 4]) -> Self {
        Rect::new(x, y, width, height)
    }
}

/// A barcode found in a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBarcode {
    pub id: String,
    pub rect: Rect,
}

/// Opens the camera at the start of every capture run
pub trait CameraProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn Camera>, CaptureError>;
}

/// Open camera; dropped (released) when the run ends
pub trait Camera: Send {
    /// Blocks until the next frame is available. Any error ends the run.
    fn grab(&mut self) -> Result<Frame, CaptureError>;
}

pub trait BarcodeDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> anyhow::Result<Vec<DecodedBarcode>>;
}

/// Raw OCR text of a frame; roster matching happens in [`crate::roster::Roster`]
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, frame: &Frame) -> anyhow::Result<String>;
}

/// Finds the badge photo region, if one is visible
pub trait PhotoLocator: Send + Sync {
    fn locate(&self, frame: &Frame) -> Option<Rect>;
}

pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &Frame) -> anyhow::Result<Bytes>;
}

/// The external collaborators driven by the capture loop
#[derive(Clone)]
pub struct Collaborators {
    pub camera: Arc<dyn CameraProvider>,
    pub decoder: Arc<dyn BarcodeDecoder>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub photo_locator: Arc<dyn PhotoLocator>,
    pub encoder: Arc<dyn FrameEncoder>,
}

impl Collaborators {
    /// Replay frames from `dir`, reading detections from JSON sidecar files
    pub fn replay(dir: impl Into<PathBuf>, looping: bool, jpeg_quality: u8) -> Self {
        let vision = Arc::new(SidecarVision::new());
        Self {
            camera: Arc::new(ReplayCameraProvider::new(dir, looping)),
            decoder: vision.clone(),
            recognizer: vision.clone(),
            photo_locator: vision,
            encoder: Arc::new(JpegFrameEncoder::new(jpeg_quality)),
        }
    }
}
