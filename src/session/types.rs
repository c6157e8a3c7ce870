//! Session type definitions
//!
//! Detection events, resolutions, decision outcomes and the snapshots handed
//! out to API callers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

/// Name a barcode resolves to once its unknown reads cross the threshold
pub const UNKNOWN_STUDENT: &str = "Unknown Student";

/// Name candidate produced by the OCR matcher for one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// A roster member
    Roster(String),
    /// OCR text matched nobody on the roster
    Unknown,
}

impl Candidate {
    pub fn from_match(name: Option<&str>) -> Self {
        match name {
            Some(name) => Candidate::Roster(name.to_string()),
            None => Candidate::Unknown,
        }
    }
}

/// One barcode observation from a single frame
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub barcode_id: String,
    pub candidate: Candidate,
    pub observed_at: Instant,
}

impl DetectionEvent {
    pub fn new(barcode_id: impl Into<String>, candidate: Candidate, observed_at: Instant) -> Self {
        Self {
            barcode_id: barcode_id.into(),
            candidate,
            observed_at,
        }
    }
}

/// Name a detection resolves to after the unknown-read gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Confident roster match
    Resolved(String),
    /// Unknown badge accepted after enough reads; carries the barcode that got it there
    Provisional { barcode_id: String },
}

impl Resolution {
    /// Name recorded in the scanned set and emitted on the queue
    pub fn name(&self) -> &str {
        match self {
            Resolution::Resolved(name) => name,
            Resolution::Provisional { .. } => UNKNOWN_STUDENT,
        }
    }
}

/// Confirmed attendance, handed to exactly one poller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_name: String,
    pub student_id: String,
}

/// Most recent confirmed scan
#[derive(Debug, Clone)]
pub struct LastScan {
    pub name: String,
    pub barcode_id: String,
    /// Monotonic time used for the cooldown window
    pub at: Instant,
    /// Wall-clock time reported to API callers
    pub scanned_at: DateTime<Utc>,
}

/// What the decision algorithm did with one detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Unknown read below the threshold, nothing emitted
    Pending { reads: u32, threshold: u32 },
    /// New confirmed scan, record enqueued
    Accepted(AttendanceRecord),
    /// Name already scanned this session
    Duplicate { name: String },
    /// A second unknown badge crossed the threshold after another one already
    /// claimed "Unknown Student"; deduplicated like any other repeat
    ProvisionalCollision {
        barcode_id: String,
        first_barcode_id: String,
    },
    /// Same name as the last scan inside the cooldown window
    CooldownSuppressed { name: String },
}

impl ScanOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ScanOutcome::Accepted(_))
    }
}

/// Camera loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraLifecycle {
    Stopped,
    Running,
}

/// Last scan as reported by `status()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastScanView {
    pub name: String,
    pub id: String,
    pub scanned_at: DateTime<Utc>,
}

/// Consistent read-only view of the session, taken under the session lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub running: bool,
    pub last_scan: Option<LastScanView>,
    pub total_scanned: usize,
    pub scanned_students: Vec<String>,
    pub pending_unknown: usize,
}
