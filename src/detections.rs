//! Presence detections accumulated between two telemetry samples.

use core::sync::atomic::{AtomicU32, Ordering};

pub struct DetectionCounter {
    count: AtomicU32,
}

impl DetectionCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// Record one detection. Saturates instead of wrapping.
    pub fn increment(&self) {
        let _ = self
            .count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1));
    }

    pub fn peek(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Read and reset in one step.
    pub fn take(&self) -> u32 {
        self.count.swap(0, Ordering::Relaxed)
    }
}

impl Default for DetectionCounter {
    fn default() -> Self {
        Self::new()
    }
}
