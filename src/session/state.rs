//! Scan session state and the per-detection decision algorithm
//!
//! `SessionState` is never shared directly: the controller keeps it behind its
//! single session lock and every method here runs as one critical section.

use chrono::Utc;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::queue::AttendanceQueue;
use super::types::{
    AttendanceRecord, Candidate, DetectionEvent, LastScan, LastScanView, Resolution, ScanOutcome,
};
use super::unknown::UnknownReadTracker;
use crate::error::SessionError;

/// Default seconds between two confirmed scans of the same name
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

/// Everything a reset clears
#[derive(Debug)]
pub struct SessionState {
    scanned: HashSet<String>,
    /// Same names as `scanned`, in acceptance order
    scan_order: Vec<String>,
    last_scan: Option<LastScan>,
    unknown: UnknownReadTracker,
    /// Barcode that first got "Unknown Student" into the scanned set
    provisional_owner: Option<String>,
    cooldown: Duration,
}

impl SessionState {
    pub fn new(cooldown: Duration, unknown_threshold: u32) -> Self {
        Self {
            scanned: HashSet::new(),
            scan_order: Vec::new(),
            last_scan: None,
            unknown: UnknownReadTracker::new(unknown_threshold),
            provisional_owner: None,
            cooldown,
        }
    }

    /// Run one detection through the unknown gate, dedup and cooldown checks
    ///
    /// Accepted scans are pushed onto `queue` before returning, so callers
    /// holding the session lock never expose a half-applied decision.
    pub fn apply(&mut self, event: &DetectionEvent, queue: &AttendanceQueue) -> ScanOutcome {
        let resolution = match &event.candidate {
            Candidate::Roster(name) => {
                self.unknown.clear(&event.barcode_id);
                Resolution::Resolved(name.clone())
            }
            Candidate::Unknown => {
                let reads = self.unknown.record(&event.barcode_id);
                if !self.unknown.reached(reads) {
                    debug!(
                        "Unknown read #{}/{} for ID: {}",
                        reads,
                        self.unknown.threshold(),
                        event.barcode_id
                    );
                    return ScanOutcome::Pending {
                        reads,
                        threshold: self.unknown.threshold(),
                    };
                }
                Resolution::Provisional {
                    barcode_id: event.barcode_id.clone(),
                }
            }
        };

        let name = resolution.name();

        if self.scanned.contains(name) {
            if let Resolution::Provisional { barcode_id } = &resolution {
                if let Some(first) = self
                    .provisional_owner
                    .as_ref()
                    .filter(|owner| *owner != barcode_id)
                {
                    warn!(
                        "Unknown badge {} collides with already accepted unknown badge {}",
                        barcode_id, first
                    );
                    return ScanOutcome::ProvisionalCollision {
                        barcode_id: barcode_id.clone(),
                        first_barcode_id: first.clone(),
                    };
                }
            }
            debug!("Already scanned: {} (ID: {})", name, event.barcode_id);
            return ScanOutcome::Duplicate {
                name: name.to_string(),
            };
        }

        let cooled_down = match &self.last_scan {
            None => true,
            Some(last) => {
                last.name != name
                    || event.observed_at.saturating_duration_since(last.at) > self.cooldown
            }
        };

        if !cooled_down {
            debug!("Cooldown active for {}", name);
            return ScanOutcome::CooldownSuppressed {
                name: name.to_string(),
            };
        }

        let record = AttendanceRecord {
            student_name: name.to_string(),
            student_id: event.barcode_id.clone(),
        };

        self.insert_scanned(name);
        if let Resolution::Provisional { barcode_id } = &resolution {
            self.provisional_owner = Some(barcode_id.clone());
        }
        self.last_scan = Some(LastScan {
            name: name.to_string(),
            barcode_id: event.barcode_id.clone(),
            at: event.observed_at,
            scanned_at: Utc::now(),
        });
        queue.enqueue(record.clone());

        info!(
            "✅ Added to queue: {} - {} (total unique: {})",
            record.student_name,
            record.student_id,
            self.scanned.len()
        );

        ScanOutcome::Accepted(record)
    }

    /// Accept a record that bypassed the capture loop
    ///
    /// Only the scanned-set check applies; the last scan is left untouched.
    pub fn submit(
        &mut self,
        record: AttendanceRecord,
        queue: &AttendanceQueue,
    ) -> Result<(), SessionError> {
        if self.scanned.contains(&record.student_name) {
            return Err(SessionError::Duplicate {
                name: record.student_name,
            });
        }

        self.insert_scanned(&record.student_name);
        info!(
            "✅ Received scan: {} - {}",
            record.student_name, record.student_id
        );
        queue.enqueue(record);
        Ok(())
    }

    /// Clear scanned names, unknown counters, last scan and pending records
    pub fn reset(&mut self, queue: &AttendanceQueue) -> usize {
        self.scanned.clear();
        self.scan_order.clear();
        self.unknown.reset();
        self.last_scan = None;
        self.provisional_owner = None;
        queue.drain()
    }

    fn insert_scanned(&mut self, name: &str) {
        if self.scanned.insert(name.to_string()) {
            self.scan_order.push(name.to_string());
        }
    }

    pub fn is_scanned(&self, name: &str) -> bool {
        self.scanned.contains(name)
    }

    pub fn total_scanned(&self) -> usize {
        self.scanned.len()
    }

    /// Scanned names in acceptance order
    pub fn scanned_names(&self) -> &[String] {
        &self.scan_order
    }

    pub fn last_scan(&self) -> Option<&LastScan> {
        self.last_scan.as_ref()
    }

    pub fn last_scan_view(&self) -> Option<LastScanView> {
        self.last_scan.as_ref().map(|last| LastScanView {
            name: last.name.clone(),
            id: last.barcode_id.clone(),
            scanned_at: last.scanned_at,
        })
    }

    pub fn unknown(&self) -> &UnknownReadTracker {
        &self.unknown
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN, super::unknown::DEFAULT_UNKNOWN_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::UNKNOWN_STUDENT;

    fn roster_read(id: &str, name: &str, at: Instant) -> DetectionEvent {
        DetectionEvent::new(id, Candidate::Roster(name.to_string()), at)
    }

    fn unknown_read(id: &str, at: Instant) -> DetectionEvent {
        DetectionEvent::new(id, Candidate::Unknown, at)
    }

    #[test]
    fn test_first_roster_read_is_accepted() {
        let mut state = SessionState::default();
        let queue = AttendanceQueue::new();
        let now = Instant::now();

        let outcome = state.apply(&roster_read("B1", "Ryan Fu", now), &queue);

        let expected = AttendanceRecord {
            student_name: "Ryan Fu".to_string(),
            student_id: "B1".to_string(),
        };
        assert_eq!(outcome, ScanOutcome::Accepted(expected.clone()));
        assert_eq!(queue.try_dequeue(), Some(expected));
        assert!(queue.try_dequeue().is_none());

        let last = state.last_scan().unwrap();
        assert_eq!(last.name, "Ryan Fu");
        assert_eq!(last.barcode_id, "B1");
    }

    #[test]
    fn test_repeat_read_is_duplicate() {
        let mut state = SessionState::default();
        let queue = AttendanceQueue::new();
        let now = Instant::now();

        state.apply(&roster_read("B1", "Ryan Fu", now), &queue);
        let again = state.apply(
            &roster_read("B1", "Ryan Fu", now + Duration::from_millis(40)),
            &queue,
        );
        let much_later = state.apply(
            &roster_read("B9", "Ryan Fu", now + Duration::from_secs(60)),
            &queue,
        );

        assert_eq!(again, ScanOutcome::Duplicate { name: "Ryan Fu".into() });
        assert_eq!(much_later, ScanOutcome::Duplicate { name: "Ryan Fu".into() });
        assert_eq!(queue.len(), 1);
        assert_eq!(state.total_scanned(), 1);
    }

    #[test]
    fn test_unknown_reads_gate_until_threshold() {
        let mut state = SessionState::new(DEFAULT_COOLDOWN, 15);
        let queue = AttendanceQueue::new();
        let now = Instant::now();

        for i in 1..15 {
            let outcome = state.apply(&unknown_read("B2", now), &queue);
            assert_eq!(outcome, ScanOutcome::Pending { reads: i, threshold: 15 });
        }
        assert!(queue.is_empty());
        assert_eq!(state.total_scanned(), 0);

        let outcome = state.apply(&unknown_read("B2", now), &queue);
        assert_eq!(
            outcome,
            ScanOutcome::Accepted(AttendanceRecord {
                student_name: UNKNOWN_STUDENT.to_string(),
                student_id: "B2".to_string(),
            })
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_second_unknown_badge_collides() {
        let mut state = SessionState::new(DEFAULT_COOLDOWN, 15);
        let queue = AttendanceQueue::new();
        let now = Instant::now();

        for _ in 0..15 {
            state.apply(&unknown_read("B2", now), &queue);
        }
        assert_eq!(queue.len(), 1);

        let mut last = None;
        for _ in 0..15 {
            last = Some(state.apply(&unknown_read("B3", now), &queue));
        }

        assert_eq!(
            last,
            Some(ScanOutcome::ProvisionalCollision {
                barcode_id: "B3".to_string(),
                first_barcode_id: "B2".to_string(),
            })
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_same_unknown_badge_after_acceptance_is_plain_duplicate() {
        let mut state = SessionState::new(DEFAULT_COOLDOWN, 2);
        let queue = AttendanceQueue::new();
        let now = Instant::now();

        state.apply(&unknown_read("B2", now), &queue);
        assert!(state.apply(&unknown_read("B2", now), &queue).is_accepted());

        let outcome = state.apply(&unknown_read("B2", now), &queue);
        assert_eq!(outcome, ScanOutcome::Duplicate { name: UNKNOWN_STUDENT.into() });
    }

    #[test]
    fn test_roster_read_clears_unknown_counter() {
        let mut state = SessionState::new(DEFAULT_COOLDOWN, 15);
        let queue = AttendanceQueue::new();
        let now = Instant::now();

        for _ in 0..5 {
            state.apply(&unknown_read("B1", now), &queue);
        }
        assert_eq!(state.unknown().count("B1"), Some(5));

        state.apply(&roster_read("B1", "Ryan Fu", now), &queue);
        assert_eq!(state.unknown().count("B1"), None);

        let outcome = state.apply(&unknown_read("B1", now), &queue);
        assert_eq!(outcome, ScanOutcome::Pending { reads: 1, threshold: 15 });
    }

    #[test]
    fn test_cooldown_suppresses_rapid_repeat_of_last_scan() {
        let mut state = SessionState::new(Duration::from_secs(3), 15);
        let queue = AttendanceQueue::new();
        let start = Instant::now();

        state.apply(&roster_read("B1", "Ryan Fu", start), &queue);
        // Last scan survives but the scanned set no longer holds the name
        state.scanned.clear();
        state.scan_order.clear();

        let within = state.apply(
            &roster_read("B1", "Ryan Fu", start + Duration::from_secs(2)),
            &queue,
        );
        assert_eq!(within, ScanOutcome::CooldownSuppressed { name: "Ryan Fu".into() });

        let at_boundary = state.apply(
            &roster_read("B1", "Ryan Fu", start + Duration::from_secs(3)),
            &queue,
        );
        assert_eq!(at_boundary, ScanOutcome::CooldownSuppressed { name: "Ryan Fu".into() });

        let after = state.apply(
            &roster_read("B1", "Ryan Fu", start + Duration::from_millis(3001)),
            &queue,
        );
        assert!(after.is_accepted());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_cooldown_does_not_block_other_names() {
        let mut state = SessionState::default();
        let queue = AttendanceQueue::new();
        let now = Instant::now();

        state.apply(&roster_read("B1", "Ryan Fu", now), &queue);
        let other = state.apply(&roster_read("B4", "Alice Su", now), &queue);

        assert!(other.is_accepted());
        assert_eq!(state.scanned_names(), &["Ryan Fu".to_string(), "Alice Su".to_string()]);
    }

    #[test]
    fn test_submit_rejects_scanned_name() {
        let mut state = SessionState::default();
        let queue = AttendanceQueue::new();

        state.apply(&roster_read("B1", "Ryan Fu", Instant::now()), &queue);

        let result = state.submit(
            AttendanceRecord {
                student_name: "Ryan Fu".into(),
                student_id: "X".into(),
            },
            &queue,
        );
        assert_eq!(result, Err(SessionError::Duplicate { name: "Ryan Fu".into() }));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_submit_does_not_touch_last_scan() {
        let mut state = SessionState::default();
        let queue = AttendanceQueue::new();

        state
            .submit(
                AttendanceRecord {
                    student_name: "Alice Su".into(),
                    student_id: "S7".into(),
                },
                &queue,
            )
            .unwrap();

        assert!(state.last_scan().is_none());
        assert!(state.is_scanned("Alice Su"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = SessionState::new(DEFAULT_COOLDOWN, 15);
        let queue = AttendanceQueue::new();
        let now = Instant::now();

        state.apply(&roster_read("B1", "Ryan Fu", now), &queue);
        state.apply(&roster_read("B4", "Alice Su", now), &queue);
        state.apply(&unknown_read("B9", now), &queue);

        let drained = state.reset(&queue);

        assert_eq!(drained, 2);
        assert_eq!(state.total_scanned(), 0);
        assert!(state.scanned_names().is_empty());
        assert!(state.last_scan().is_none());
        assert!(state.unknown().is_empty());
        assert!(queue.is_empty());

        // Names can be scanned again after a reset
        assert!(state.apply(&roster_read("B1", "Ryan Fu", now), &queue).is_accepted());
    }
}
