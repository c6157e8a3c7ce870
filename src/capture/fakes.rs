//! In-memory collaborators for capture loop tests

use anyhow::Result;
use bytes::Bytes;
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{
    BarcodeDecoder, Camera, CameraProvider, DecodedBarcode, Frame, FrameEncoder, PhotoLocator,
    Rect, TextRecognizer,
};
use crate::error::CaptureError;

/// Blank frames; optionally fails after `frames` grabs per run
#[derive(Default)]
pub struct FakeCameraProvider {
    frames: Option<usize>,
    fail_open: AtomicBool,
    opened: AtomicUsize,
    open_now: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
}

impl FakeCameraProvider {
    pub fn new(frames: Option<usize>) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Total successful opens
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Cameras currently open
    pub fn open_now(&self) -> usize {
        self.open_now.load(Ordering::SeqCst)
    }

    /// Most cameras ever open at the same time
    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

impl CameraProvider for FakeCameraProvider {
    fn open(&self) -> Result<Box<dyn Camera>, CaptureError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CaptureError::Open {
                uri: "fake".into(),
                reason: "unplugged".into(),
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(FakeCamera {
            remaining: self.frames,
            open_now: Arc::clone(&self.open_now),
        }))
    }
}

struct FakeCamera {
    remaining: Option<usize>,
    open_now: Arc<AtomicUsize>,
}

impl Camera for FakeCamera {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(CaptureError::Read("device gone".into()));
            }
            *remaining -= 1;
        }
        Ok(Frame::new(RgbImage::new(64, 48)))
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reports the same barcode / OCR text / photo for every frame
#[derive(Default)]
pub struct FakeVision {
    barcodes: Mutex<Vec<DecodedBarcode>>,
    text: Mutex<String>,
    photo: Mutex<Option<Rect>>,
}

impl FakeVision {
    pub fn show(&self, barcode_id: &str, text: &str) {
        *self.barcodes.lock() = vec![DecodedBarcode {
            id: barcode_id.to_string(),
            rect: Rect::new(4, 4, 20, 10),
        }];
        *self.text.lock() = text.to_string();
    }

    pub fn show_photo(&self, rect: Option<Rect>) {
        *self.photo.lock() = rect;
    }
}

impl BarcodeDecoder for FakeVision {
    fn decode(&self, _frame: &Frame) -> Result<Vec<DecodedBarcode>> {
        Ok(self.barcodes.lock().clone())
    }
}

impl TextRecognizer for FakeVision {
    fn recognize(&self, _frame: &Frame) -> Result<String> {
        Ok(self.text.lock().clone())
    }
}

impl PhotoLocator for FakeVision {
    fn locate(&self, _frame: &Frame) -> Option<Rect> {
        *self.photo.lock()
    }
}

impl FrameEncoder for FakeVision {
    fn encode(&self, frame: &Frame) -> Result<Bytes> {
        Ok(Bytes::from(frame.image.as_raw().clone()))
    }
}
