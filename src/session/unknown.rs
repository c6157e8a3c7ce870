//! Per-barcode counter of low-confidence (unknown) reads

use std::collections::HashMap;

/// Default number of unknown reads before a badge is accepted as "Unknown Student"
pub const DEFAULT_UNKNOWN_THRESHOLD: u32 = 15;

/// Gates unknown reads until a barcode has been seen often enough
#[derive(Debug, Clone)]
pub struct UnknownReadTracker {
    counts: HashMap<String, u32>,
    threshold: u32,
}

impl UnknownReadTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            counts: HashMap::new(),
            threshold: threshold.max(1),
        }
    }

    /// Count one more unknown read and return the new total
    pub fn record(&mut self, barcode_id: &str) -> u32 {
        let count = self.counts.entry(barcode_id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Whether `reads` is enough to accept the badge
    pub fn reached(&self, reads: u32) -> bool {
        reads >= self.threshold
    }

    /// Forget an id after it resolved to a roster name
    pub fn clear(&mut self, barcode_id: &str) {
        self.counts.remove(barcode_id);
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }

    pub fn count(&self, barcode_id: &str) -> Option<u32> {
        self.counts.get(barcode_id).copied()
    }

    /// Number of ids with a live counter
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for UnknownReadTracker {
    fn default() -> Self {
        Self::new(DEFAULT_UNKNOWN_THRESHOLD)
    }
}
