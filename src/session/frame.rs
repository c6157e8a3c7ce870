//! Single-slot cache of the latest encoded camera frame

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// JPEG bytes of one published frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub jpeg: Bytes,
    /// Increases by one for every published frame
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Slot {
    frame: Option<EncodedFrame>,
    published: u64,
}

/// Last-writer-wins frame slot; readers get a full frame or nothing
#[derive(Debug, Default)]
pub struct FrameCache {
    slot: RwLock<Slot>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached frame and return the sequence number it was given
    pub fn swap(&self, jpeg: Bytes, captured_at: DateTime<Utc>) -> u64 {
        let mut slot = self.slot.write();
        slot.published += 1;
        let sequence = slot.published;
        slot.frame = Some(EncodedFrame {
            jpeg,
            sequence,
            captured_at,
        });
        sequence
    }

    /// Current frame, or `None` before the first capture
    pub fn read(&self) -> Option<EncodedFrame> {
        self.slot.read().frame.clone()
    }

    /// Number of frames published so far
    pub fn published(&self) -> u64 {
        self.slot.read().published
    }
}
