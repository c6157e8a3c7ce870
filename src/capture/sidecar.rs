//! Detections recorded next to replayed frames
//!
//! For a frame `frames/0042.png` the file `frames/0042.json` describes what
//! the vision stack saw in it:
//!
//! ```json
//! {"barcodes": [{"id": "B1", "rect": [40, 300, 180, 60]}],
//!  "text": "STUDENT ID\nRyan Fu",
//!  "photo": [20, 20, 120, 160]}
//! ```
//!
//! Frames without a sidecar (or live frames without a source path) contain
//! nothing.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

use super::{BarcodeDecoder, DecodedBarcode, Frame, PhotoLocator, Rect, TextRecognizer};

#[derive(Debug, Default, Deserialize)]
pub struct FrameScript {
    #[serde(default)]
    pub barcodes: Vec<ScriptedBarcode>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub photo: Option<Rect>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptedBarcode {
    pub id: String,
    pub rect: Rect,
}

/// Barcode decoder, OCR and photo locator backed by sidecar JSON files
#[derive(Debug, Default, Clone, Copy)]
pub struct SidecarVision;

impl SidecarVision {
    pub fn new() -> Self {
        Self
    }

    fn sidecar_path(frame: &Frame) -> Option<PathBuf> {
        frame.source.as_ref().map(|p| p.with_extension("json"))
    }

    /// Load the script for a frame; a missing file is an empty script
    pub fn script(frame: &Frame) -> Result<FrameScript> {
        let Some(path) = Self::sidecar_path(frame) else {
            return Ok(FrameScript::default());
        };
        if !path.exists() {
            return Ok(FrameScript::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read sidecar: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid sidecar JSON: {}", path.display()))
    }
}

impl BarcodeDecoder for SidecarVision {
    fn decode(&self, frame: &Frame) -> Result<Vec<DecodedBarcode>> {
        Ok(Self::script(frame)?
            .barcodes
            .into_iter()
            .map(|b| DecodedBarcode {
                id: b.id,
                rect: b.rect,
            })
            .collect())
    }
}

impl TextRecognizer for SidecarVision {
    fn recognize(&self, frame: &Frame) -> Result<String> {
        Ok(Self::script(frame)?.text)
    }
}

impl PhotoLocator for SidecarVision {
    fn locate(&self, frame: &Frame) -> Option<Rect> {
        match Self::script(frame) {
            Ok(script) => script.photo,
            Err(e) => {
                warn!("Photo lookup failed: {:#}", e);
                None
            }
        }
    }
}
