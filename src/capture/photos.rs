//! Badge photo side-channel
//!
//! Cropped badge photos are handed to a single writer thread through a bounded
//! channel. Submission never blocks the capture loop: when the writer falls
//! behind, new photos are dropped and counted. Write failures are logged and
//! counted too; neither ever touches session state.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Default number of photos waiting to be written before new ones are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// One cropped badge photo waiting to be written
#[derive(Debug, Clone)]
pub struct PhotoJob {
    pub image: RgbImage,
    pub barcode_id: String,
    pub student_name: String,
    pub taken_at: DateTime<Local>,
}

impl PhotoJob {
    /// `<id>_<name>_<YYYYmmdd_HHMMSS>.png` with spaces and separators replaced
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.png",
            sanitize(&self.barcode_id),
            sanitize(&self.student_name),
            self.taken_at.format("%Y%m%d_%H%M%S")
        )
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

/// Counters exposed for logging and tests
#[derive(Debug, Default)]
struct Counters {
    saved: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoStats {
    pub saved: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// Handle to the photo writer thread
///
/// Cheap to clone; the writer exits once every handle is dropped.
#[derive(Clone)]
pub struct PhotoSink {
    tx: Sender<PhotoJob>,
    counters: Arc<Counters>,
    dir: PathBuf,
}

impl PhotoSink {
    /// Create the photo directory and start the writer thread
    pub fn spawn(dir: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create photo directory: {}", dir.display()))?;

        let (tx, rx) = channel::bounded(capacity.max(1));
        let counters = Arc::new(Counters::default());

        let worker_dir = dir.clone();
        let worker_counters = Arc::clone(&counters);
        thread::Builder::new()
            .name("photo-writer".into())
            .spawn(move || run_writer(rx, worker_dir, worker_counters))
            .context("Failed to spawn photo writer thread")?;

        info!("Photo writer started for: {}", dir.display());
        Ok(Self { tx, counters, dir })
    }

    /// Queue a photo for writing; returns false if it was dropped
    pub fn submit(&self, job: PhotoJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Photo queue full, dropping photo for {} ({})",
                    job.student_name, job.barcode_id
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Photo writer is gone, dropping photo");
                false
            }
        }
    }

    pub fn stats(&self) -> PhotoStats {
        PhotoStats {
            saved: self.counters.saved.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn run_writer(rx: Receiver<PhotoJob>, dir: PathBuf, counters: Arc<Counters>) {
    for job in rx.iter() {
        let path = dir.join(job.file_name());
        match job.image.save(&path) {
            Ok(()) => {
                counters.saved.fetch_add(1, Ordering::Relaxed);
                info!("📸 Saved student photo: {}", path.display());
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to save photo {}: {}", path.display(), e);
            }
        }
    }
    debug!("Photo writer exiting");
}
