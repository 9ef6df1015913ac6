//! Provisioning mode and the network-attach predicate.
//!
//! Both are plain flags written by one task and polled by others.  While
//! provisioning is active the acquisition worker leaves the radio alone;
//! the link flag only gates delivery.

use core::sync::atomic::{AtomicBool, Ordering};

pub struct ProvisioningFlag {
    active: AtomicBool,
}

impl ProvisioningFlag {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Flip the flag and return the new state.
    pub fn toggle(&self) -> bool {
        !self.active.fetch_xor(true, Ordering::AcqRel)
    }
}

impl Default for ProvisioningFlag {
    fn default() -> Self {
        Self::new()
    }
}

pub struct NetworkLink {
    up: AtomicBool,
}

impl NetworkLink {
    pub const fn new() -> Self {
        Self {
            up: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    /// Returns true when the state changed.
    pub fn set_connected(&self, up: bool) -> bool {
        self.up.swap(up, Ordering::AcqRel) != up
    }
}

impl Default for NetworkLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a button held for `held_ms` counts as a long press.
pub fn long_press_reached(held_ms: u64, threshold_ms: u64) -> bool {
    held_ms >= threshold_ms
}
