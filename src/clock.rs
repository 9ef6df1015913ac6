//! Wall-clock time for telemetry timestamps.
//!
//! The board has no RTC backup, so the epoch is learned from the uplink
//! (`TIME?`) and kept as an offset against embassy's monotonic uptime.
//! Until the first sync, timestamps are seconds since boot.

use core::cell::Cell;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Instant;

pub struct EpochClock {
    /// Epoch seconds at uptime zero.
    offset: Mutex<CriticalSectionRawMutex, Cell<Option<i64>>>,
}

impl EpochClock {
    pub const fn new() -> Self {
        Self {
            offset: Mutex::new(Cell::new(None)),
        }
    }

    /// Anchor the clock: `epoch_secs` was the wall time at `uptime_secs`.
    pub fn sync_at(&self, epoch_secs: i64, uptime_secs: u64) {
        let offset = epoch_secs.saturating_sub(uptime_secs as i64);
        self.offset.lock(|o| o.set(Some(offset)));
        info!("Clock synced, epoch {}", epoch_secs);
    }

    pub fn sync(&self, epoch_secs: i64) {
        self.sync_at(epoch_secs, Instant::now().as_secs());
    }

    pub fn is_synced(&self) -> bool {
        self.offset.lock(|o| o.get().is_some())
    }

    pub fn now_at(&self, uptime_secs: u64) -> i64 {
        let offset = self.offset.lock(|o| o.get()).unwrap_or(0);
        offset.saturating_add(uptime_secs as i64)
    }

    /// Current timestamp in seconds.
    pub fn now(&self) -> i64 {
        self.now_at(Instant::now().as_secs())
    }
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::new()
    }
}
