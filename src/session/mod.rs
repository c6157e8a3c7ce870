//! Scan session - the state coordinator between the capture loop and pollers
//!
//! - [`SessionState`]: scanned names, last scan, unknown counters and the
//!   decision algorithm applied to every detection
//! - [`AttendanceQueue`]: FIFO of confirmed records, drained by pollers
//! - [`FrameCache`]: latest encoded frame
//! - [`SessionController`]: lifecycle (start/stop), reset, status and direct
//!   submission, all serialized on one session lock

pub mod controller;
mod frame;
mod queue;
mod state;
mod types;
mod unknown;

pub use controller::{CameraSession, SessionController, SessionSettings, DEFAULT_LOOP_INTERVAL};
pub use frame::{EncodedFrame, FrameCache};
pub use queue::AttendanceQueue;
pub use state::{SessionState, DEFAULT_COOLDOWN};
pub use types::{
    AttendanceRecord, CameraLifecycle, Candidate, DetectionEvent, LastScan, LastScanView,
    Resolution, ScanOutcome, SessionStatus, UNKNOWN_STUDENT,
};
pub use unknown::{UnknownReadTracker, DEFAULT_UNKNOWN_THRESHOLD};
