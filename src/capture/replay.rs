//! Camera source replaying recorded frames from a directory

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Camera, CameraProvider, Frame};
use crate::error::CaptureError;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Opens a [`ReplayCamera`] over every image file in `dir`, sorted by name
#[derive(Debug, Clone)]
pub struct ReplayCameraProvider {
    dir: PathBuf,
    looping: bool,
}

impl ReplayCameraProvider {
    pub fn new(dir: impl Into<PathBuf>, looping: bool) -> Self {
        Self {
            dir: dir.into(),
            looping,
        }
    }

    fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl CameraProvider for ReplayCameraProvider {
    fn open(&self) -> Result<Box<dyn Camera>, CaptureError> {
        let files = Self::list_frames(&self.dir).map_err(|e| CaptureError::Open {
            uri: self.dir.display().to_string(),
            reason: e.to_string(),
        })?;

        if files.is_empty() {
            return Err(CaptureError::Open {
                uri: self.dir.display().to_string(),
                reason: "no image files found".to_string(),
            });
        }

        info!(
            "Replaying {} frame(s) from {}{}",
            files.len(),
            self.dir.display(),
            if self.looping { " (looping)" } else { "" }
        );

        Ok(Box::new(ReplayCamera {
            files,
            next: 0,
            looping: self.looping,
        }))
    }
}

/// Yields the replay files in order, one per `grab`
pub struct ReplayCamera {
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
}

impl Camera for ReplayCamera {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        if self.next >= self.files.len() {
            if !self.looping {
                return Err(CaptureError::Exhausted);
            }
            debug!("Replay reached the end, starting over");
            self.next = 0;
        }

        let path = &self.files[self.next];
        self.next += 1;

        let image = image::open(path)?.to_rgb8();
        Ok(Frame {
            image,
            captured_at: Utc::now(),
            source: Some(path.clone()),
        })
    }
}
