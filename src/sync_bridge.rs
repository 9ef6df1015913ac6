//! Single-slot rendezvous between the radio task and a waiting worker.
//!
//! The radio side raises the bridge exactly once per acquisition cycle;
//! the worker waits on it with a timeout.  A raise that happens while
//! nobody waits is latched, never lost and never blocks the raiser.  Only
//! one waiter is supported at a time.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};

/// The wait ran past its deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimedOut;

pub struct SyncBridge<T: Send> {
    slot: Signal<CriticalSectionRawMutex, T>,
}

impl<T: Send> SyncBridge<T> {
    pub const fn new() -> Self {
        Self {
            slot: Signal::new(),
        }
    }

    /// Latch `value`, waking the waiter if there is one.
    ///
    /// A second raise before the first is consumed overwrites it.
    pub fn raise(&self, value: T) {
        self.slot.signal(value);
    }

    /// Discard a latched value left over from an earlier cycle.
    pub fn reset(&self) {
        self.slot.reset();
    }

    /// Whether a value is latched and not yet consumed.
    pub fn is_raised(&self) -> bool {
        self.slot.signaled()
    }

    /// Consume the latched value without waiting.
    pub fn try_take(&self) -> Option<T> {
        self.slot.try_take()
    }

    /// Wait for the next raise, giving up after `timeout`.
    pub async fn wait(&self, timeout: Duration) -> Result<T, TimedOut> {
        with_timeout(timeout, self.slot.wait())
            .await
            .map_err(|_| TimedOut)
    }
}

impl<T: Send> Default for SyncBridge<T> {
    fn default() -> Self {
        Self::new()
    }
}
