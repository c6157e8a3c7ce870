//! Error types shared by the session controller and the capture loop

use thiserror::Error;

/// Rejected session operations (state conflicts and malformed submissions)
///
/// None of these are fatal: they are reported back to the caller and the
/// session keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Camera already running")]
    AlreadyRunning,
    #[error("Camera not running")]
    NotRunning,
    #[error("Student already scanned: {name}")]
    Duplicate { name: String },
    #[error("Missing data: {0}")]
    MissingField(&'static str),
    #[error("Failed to spawn capture loop: {0}")]
    Spawn(String),
}

/// Camera / frame acquisition failures
///
/// Any of these ends the current capture run; the controller falls back to
/// `Stopped` and can be started again.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open camera source {uri:?}: {reason}")]
    Open { uri: String, reason: String },
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("camera source exhausted")]
    Exhausted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
