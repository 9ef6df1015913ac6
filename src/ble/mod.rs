//! Bluetooth Low Energy acquisition subsystem.
//!
//! The firmware drives the radio in **Central** role:
//!
//! 1. **Scanner** - active scan until the configured sensor name shows up.
//! 2. **Discovery** - primary service and characteristic discovery for the
//!    Environmental Sensing and Battery services.
//! 3. **Read chain** - Temperature, Humidity, Battery Level, then disconnect.
//!
//! The radio stack is strictly event driven.  [`discovery::DiscoveryMachine`]
//! consumes [`RadioEvent`]s and issues requests through the [`RadioStack`]
//! trait; the embedded binary executes those requests on the SoftDevice and
//! feeds the results back as events.

pub mod adv_parser;
pub mod attributes;
pub mod discovery;
pub mod reading;

use crate::error::BleError;
use heapless::Deque;

/// Connection handle assigned by the radio stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

/// Attribute handle on the peer; valid for one connection only.
///
/// Zero means "not yet resolved".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttributeHandle(pub u16);

impl AttributeHandle {
    pub const UNRESOLVED: AttributeHandle = AttributeHandle(0);

    pub fn is_resolved(self) -> bool {
        self.0 != 0
    }
}

/// Inclusive attribute handle range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandleRange {
    pub start: AttributeHandle,
    pub end: AttributeHandle,
}

impl HandleRange {
    /// The whole attribute database.
    pub const ALL: HandleRange = HandleRange {
        start: AttributeHandle(0x0001),
        end: AttributeHandle(0xFFFF),
    };

    pub fn contains(&self, handle: AttributeHandle) -> bool {
        handle.0 >= self.start.0 && handle.0 <= self.end.0
    }
}

/// BLE device address (little-endian bytes + address type).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress {
    pub kind: u8,
    pub bytes: [u8; 6],
}

/// Completion status of a discovery procedure.
///
/// The stack reports "no more results" with a dedicated done status, which
/// must not be confused with a procedure error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProcedureStatus {
    Done,
    Failed(BleError),
}

/// Events delivered by the radio stack.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RadioEvent<'a> {
    /// Advertisement or scan response received.
    Advertisement { peer: PeerAddress, data: &'a [u8] },
    /// The scan window closed without being cancelled.
    ScanComplete,
    /// Outcome of a connection attempt.
    Connected(Result<ConnHandle, BleError>),
    /// A primary service was discovered.
    ServiceFound {
        conn: ConnHandle,
        uuid: u16,
        range: HandleRange,
    },
    /// Primary service discovery finished.
    ServicesDone { conn: ConnHandle, status: ProcedureStatus },
    /// A characteristic was discovered within the requested range.
    CharacteristicFound {
        conn: ConnHandle,
        uuid: u16,
        value_handle: AttributeHandle,
    },
    /// Characteristic discovery for the requested range finished.
    CharacteristicsDone { conn: ConnHandle, status: ProcedureStatus },
    /// An attribute read completed (successfully or not).
    ReadComplete {
        conn: ConnHandle,
        handle: AttributeHandle,
        result: Result<&'a [u8], BleError>,
    },
    /// The link dropped, locally or peer initiated.
    Disconnected { conn: ConnHandle, reason: u8 },
}

/// Scan parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParams {
    /// Active scanning requests scan responses, which carry the name.
    pub active: bool,
    /// The scan stops by itself after this long.
    pub window_secs: u64,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            active: true,
            window_secs: crate::config::BLE_SCAN_WINDOW_SECS,
        }
    }
}

/// Operations the discovery machine asks of the radio stack.
///
/// Every call only *starts* a procedure; its outcome comes back later as a
/// [`RadioEvent`].  Both cancel calls must be idempotent: the stack may have
/// finished or failed the procedure on its own already.
pub trait RadioStack {
    fn start_scan(&mut self, params: ScanParams) -> Result<(), BleError>;
    fn cancel_scan(&mut self);
    fn connect(&mut self, peer: PeerAddress, timeout_ms: u32) -> Result<(), BleError>;
    fn cancel_connect(&mut self);
    fn discover_services(&mut self, conn: ConnHandle, range: HandleRange) -> Result<(), BleError>;
    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: HandleRange,
    ) -> Result<(), BleError>;
    fn read(&mut self, conn: ConnHandle, handle: AttributeHandle) -> Result<(), BleError>;
    fn terminate(&mut self, conn: ConnHandle) -> Result<(), BleError>;
}

/// A queued radio request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioRequest {
    StartScan(ScanParams),
    CancelScan,
    Connect { peer: PeerAddress, timeout_ms: u32 },
    CancelConnect,
    DiscoverServices { conn: ConnHandle, range: HandleRange },
    DiscoverCharacteristics { conn: ConnHandle, range: HandleRange },
    Read { conn: ConnHandle, handle: AttributeHandle },
    Terminate { conn: ConnHandle },
}

/// Depth of the request queue. One event never produces more than three
/// requests (cancel scan + connect, or cancel scan + cancel connect +
/// terminate on abort).
pub const REQUEST_QUEUE_DEPTH: usize = 8;

/// [`RadioStack`] that records requests for an executor to run later.
///
/// The machine cannot call back into the stack re-entrantly, so the radio
/// task drains this queue after every event and turns each request into a
/// SoftDevice procedure.
pub struct RequestQueue {
    pending: Deque<RadioRequest, REQUEST_QUEUE_DEPTH>,
}

impl RequestQueue {
    pub const fn new() -> Self {
        Self {
            pending: Deque::new(),
        }
    }

    pub fn pop(&mut self) -> Option<RadioRequest> {
        self.pending.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RadioRequest> {
        self.pending.iter()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn push(&mut self, req: RadioRequest) -> Result<(), BleError> {
        self.pending.push_back(req).map_err(|_| BleError::Busy)
    }
}

impl RadioStack for RequestQueue {
    fn start_scan(&mut self, params: ScanParams) -> Result<(), BleError> {
        self.push(RadioRequest::StartScan(params))
    }

    fn cancel_scan(&mut self) {
        // Drop a scan that was queued but never started.
        if let Some(pos) = self
            .pending
            .iter()
            .position(|r| matches!(r, RadioRequest::StartScan(_)))
        {
            remove_at(&mut self.pending, pos);
            return;
        }
        let _ = self.push(RadioRequest::CancelScan);
    }

    fn connect(&mut self, peer: PeerAddress, timeout_ms: u32) -> Result<(), BleError> {
        self.push(RadioRequest::Connect { peer, timeout_ms })
    }

    fn cancel_connect(&mut self) {
        if let Some(pos) = self
            .pending
            .iter()
            .position(|r| matches!(r, RadioRequest::Connect { .. }))
        {
            remove_at(&mut self.pending, pos);
            return;
        }
        let _ = self.push(RadioRequest::CancelConnect);
    }

    fn discover_services(&mut self, conn: ConnHandle, range: HandleRange) -> Result<(), BleError> {
        self.push(RadioRequest::DiscoverServices { conn, range })
    }

    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: HandleRange,
    ) -> Result<(), BleError> {
        self.push(RadioRequest::DiscoverCharacteristics { conn, range })
    }

    fn read(&mut self, conn: ConnHandle, handle: AttributeHandle) -> Result<(), BleError> {
        self.push(RadioRequest::Read { conn, handle })
    }

    fn terminate(&mut self, conn: ConnHandle) -> Result<(), BleError> {
        self.push(RadioRequest::Terminate { conn })
    }
}

fn remove_at(queue: &mut Deque<RadioRequest, REQUEST_QUEUE_DEPTH>, pos: usize) {
    let mut kept: Deque<RadioRequest, REQUEST_QUEUE_DEPTH> = Deque::new();
    for (i, req) in queue.iter().enumerate() {
        if i != pos {
            let _ = kept.push_back(*req);
        }
    }
    *queue = kept;
}
