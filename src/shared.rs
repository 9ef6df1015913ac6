//! State shared between the firmware tasks.
//!
//! Everything here is interior-mutable and `Sync`, so the binary keeps one
//! instance in a `static` and hands `&'static` references to each task.

use crate::ble::discovery::CycleReport;
use crate::clock::EpochClock;
use crate::detections::DetectionCounter;
use crate::provisioning::{NetworkLink, ProvisioningFlag};
use crate::sync_bridge::SyncBridge;
use crate::telemetry::latest::SharedLatestReading;
use crate::telemetry::queue::TelemetryQueue;

pub struct Shared<const N: usize> {
    /// Raised by the radio task when a cycle ends.
    pub completion: SyncBridge<CycleReport>,
    pub queue: TelemetryQueue<N>,
    pub latest: SharedLatestReading,
    pub provisioning: ProvisioningFlag,
    pub link: NetworkLink,
    pub detections: DetectionCounter,
    pub clock: EpochClock,
}

impl<const N: usize> Shared<N> {
    pub const fn new() -> Self {
        Self {
            completion: SyncBridge::new(),
            queue: TelemetryQueue::new(),
            latest: SharedLatestReading::new(),
            provisioning: ProvisioningFlag::new(),
            link: NetworkLink::new(),
            detections: DetectionCounter::new(),
            clock: EpochClock::new(),
        }
    }
}

impl<const N: usize> Default for Shared<N> {
    fn default() -> Self {
        Self::new()
    }
}
