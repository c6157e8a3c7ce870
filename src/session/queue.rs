//! Attendance queue - FIFO hand-off from the capture loop to pollers
//!
//! Backed by a lock-free `SegQueue`: `enqueue` never blocks the producer and
//! each `try_dequeue` pops at most one record, so two concurrent pollers can
//! never receive the same record.

use crossbeam::queue::SegQueue;

use super::types::AttendanceRecord;

#[derive(Debug, Default)]
pub struct AttendanceQueue {
    records: SegQueue<AttendanceRecord>,
}

impl AttendanceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, record: AttendanceRecord) {
        self.records.push(record);
    }

    /// Pop the oldest record, if any
    pub fn try_dequeue(&self) -> Option<AttendanceRecord> {
        self.records.pop()
    }

    /// Drop every pending record, returning how many were discarded
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.records.pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
