//! Scan → connect → discover → read → disconnect, one cycle at a time.
//!
//! [`DiscoveryMachine`] is a plain state machine: the radio task feeds it
//! every [`RadioEvent`] and it answers by issuing requests on a
//! [`RadioStack`].  It never blocks and never retries on its own; the
//! acquisition worker bounds each cycle with a timeout and calls
//! [`DiscoveryMachine::abort`] when that expires.
//!
//! The end of a cycle is reported exactly once, from the disconnect
//! handler, by raising the completion [`SyncBridge`] with a
//! [`CycleReport`].

use crate::acquisition::CycleCommand;
use crate::ble::adv_parser::advertises_name;
use crate::ble::attributes::{CharacteristicKind, ServiceKind};
use crate::ble::reading::SensorReading;
use crate::ble::{
    AttributeHandle, ConnHandle, HandleRange, PeerAddress, ProcedureStatus, RadioEvent,
    RadioStack, ScanParams,
};
use crate::config::{BLE_CONNECT_TIMEOUT_MS, DEFAULT_TARGET_NAME, TARGET_NAME_MAX_LEN};
use crate::error::{BleError, Error};
use crate::sync_bridge::SyncBridge;
use heapless::Vec;

/// Where the machine is within the current cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics(ServiceKind),
    /// Waiting for the read of this characteristic to complete.
    ReadingValues(CharacteristicKind),
    Disconnecting,
}

/// Handle range of one service of interest. Unresolved until discovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceDescriptor {
    pub kind: ServiceKind,
    pub start: AttributeHandle,
    pub end: AttributeHandle,
}

impl ServiceDescriptor {
    const fn unresolved(kind: ServiceKind) -> Self {
        Self {
            kind,
            start: AttributeHandle::UNRESOLVED,
            end: AttributeHandle::UNRESOLVED,
        }
    }

    pub fn is_found(&self) -> bool {
        self.start.is_resolved()
    }

    pub fn range(&self) -> HandleRange {
        HandleRange {
            start: self.start,
            end: self.end,
        }
    }
}

/// Value handle of one characteristic of interest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicDescriptor {
    pub kind: CharacteristicKind,
    pub value_handle: AttributeHandle,
}

impl CharacteristicDescriptor {
    const fn unresolved(kind: CharacteristicKind) -> Self {
        Self {
            kind,
            value_handle: AttributeHandle::UNRESOLVED,
        }
    }
}

/// Everything the machine learns during one cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConnectionContext {
    pub conn: Option<ConnHandle>,
    /// A connection attempt is outstanding; further matches are ignored.
    pub connecting: bool,
    pub services: [ServiceDescriptor; 2],
    pub characteristics: [CharacteristicDescriptor; 3],
    pub reading: SensorReading,
    /// The read chain ran to its end.
    pub valid: bool,
}

impl ConnectionContext {
    pub const fn new() -> Self {
        Self {
            conn: None,
            connecting: false,
            services: [
                ServiceDescriptor::unresolved(ServiceKind::Environmental),
                ServiceDescriptor::unresolved(ServiceKind::Battery),
            ],
            characteristics: [
                CharacteristicDescriptor::unresolved(CharacteristicKind::Temperature),
                CharacteristicDescriptor::unresolved(CharacteristicKind::Humidity),
                CharacteristicDescriptor::unresolved(CharacteristicKind::BatteryLevel),
            ],
            reading: SensorReading::empty(),
            valid: false,
        }
    }

    pub fn service(&self, kind: ServiceKind) -> &ServiceDescriptor {
        &self.services[kind.index()]
    }

    pub fn characteristic(&self, kind: CharacteristicKind) -> &CharacteristicDescriptor {
        &self.characteristics[kind.index()]
    }

    fn any_characteristic_resolved(&self) -> bool {
        self.characteristics
            .iter()
            .any(|c| c.value_handle.is_resolved())
    }
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one cycle, handed to the waiting worker.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    pub valid: bool,
    pub reading: SensorReading,
}

pub struct DiscoveryMachine<'a> {
    target: Vec<u8, TARGET_NAME_MAX_LEN>,
    phase: Phase,
    ctx: ConnectionContext,
    completion: &'a SyncBridge<CycleReport>,
    /// Set once the current cycle has been reported or aborted.
    closed: bool,
}

impl<'a> DiscoveryMachine<'a> {
    /// A machine looking for the default sensor name.
    pub fn new(completion: &'a SyncBridge<CycleReport>) -> Self {
        let mut target = Vec::new();
        // The default name is a compile-time constant well under the limit.
        let _ = target.extend_from_slice(DEFAULT_TARGET_NAME.as_bytes());
        Self {
            target,
            phase: Phase::Idle,
            ctx: ConnectionContext::new(),
            completion,
            closed: true,
        }
    }

    /// Change the broadcast name to look for. Takes effect on the next
    /// advertisement.
    pub fn set_target(&mut self, name: &[u8]) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::BufferOverflow);
        }
        let mut target = Vec::new();
        target
            .extend_from_slice(name)
            .map_err(|_| Error::BufferOverflow)?;
        self.target = target;
        Ok(())
    }

    pub fn target(&self) -> &[u8] {
        &self.target
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Start a new cycle: fresh context, active scan.
    ///
    /// A cycle still in flight is aborted first so two runs never share
    /// the context.
    pub fn begin(&mut self, radio: &mut impl RadioStack) {
        if self.phase != Phase::Idle {
            warn!("begin while {:?}, aborting previous cycle", self.phase);
            self.abort(radio);
        }
        self.ctx = ConnectionContext::new();
        self.closed = false;
        self.start_scan(radio);
    }

    /// Cancel whatever is outstanding and return to idle without
    /// reporting.  Safe to call in any phase, any number of times.
    pub fn abort(&mut self, radio: &mut impl RadioStack) {
        if self.phase == Phase::Idle && self.ctx.conn.is_none() {
            self.closed = true;
            return;
        }
        info!("Aborting cycle in {:?}", self.phase);
        radio.cancel_scan();
        if self.ctx.connecting {
            radio.cancel_connect();
        }
        if let Some(conn) = self.ctx.conn {
            if let Err(e) = radio.terminate(conn) {
                warn!("terminate on abort failed: {:?}", e);
            }
        }
        self.ctx = ConnectionContext::new();
        self.phase = Phase::Idle;
        self.closed = true;
    }

    /// Execute a command from the acquisition worker.
    pub fn apply(&mut self, cmd: CycleCommand, radio: &mut impl RadioStack) {
        match cmd {
            CycleCommand::Begin => self.begin(radio),
            CycleCommand::Abort => self.abort(radio),
        }
    }

    /// Advance the machine with one radio event.
    pub fn handle(&mut self, event: RadioEvent<'_>, radio: &mut impl RadioStack) {
        match event {
            RadioEvent::Advertisement { peer, data } => self.on_advertisement(peer, data, radio),
            RadioEvent::ScanComplete => self.on_scan_complete(radio),
            RadioEvent::Connected(result) => self.on_connected(result, radio),
            RadioEvent::ServiceFound { conn, uuid, range } => {
                self.on_service_found(conn, uuid, range)
            }
            RadioEvent::ServicesDone { conn, status } => self.on_services_done(conn, status, radio),
            RadioEvent::CharacteristicFound {
                conn,
                uuid,
                value_handle,
            } => self.on_characteristic_found(conn, uuid, value_handle),
            RadioEvent::CharacteristicsDone { conn, status } => {
                self.on_characteristics_done(conn, status, radio)
            }
            RadioEvent::ReadComplete {
                conn,
                handle,
                result,
            } => self.on_read_complete(conn, handle, result, radio),
            RadioEvent::Disconnected { conn, reason } => self.on_disconnected(conn, reason),
        }
    }

    // Scan / connect

    fn start_scan(&mut self, radio: &mut impl RadioStack) {
        self.phase = Phase::Scanning;
        match radio.start_scan(ScanParams::default()) {
            Ok(()) => info!("Scanning for target..."),
            Err(e) => warn!("scan start failed: {:?}", e),
        }
    }

    fn on_advertisement(&mut self, peer: PeerAddress, data: &[u8], radio: &mut impl RadioStack) {
        if self.phase != Phase::Scanning || self.ctx.connecting || self.ctx.conn.is_some() {
            return;
        }
        if !advertises_name(data, &self.target) {
            return;
        }
        info!("Target found at {:?}, connecting", peer.bytes);
        radio.cancel_scan();
        self.ctx.connecting = true;
        self.phase = Phase::Connecting;
        if let Err(e) = radio.connect(peer, BLE_CONNECT_TIMEOUT_MS) {
            warn!("connect request failed: {:?}", e);
            self.ctx.connecting = false;
            self.start_scan(radio);
        }
    }

    fn on_scan_complete(&mut self, radio: &mut impl RadioStack) {
        if self.phase == Phase::Scanning && !self.ctx.connecting {
            debug!("Scan window closed without a match, rescanning");
            self.start_scan(radio);
        }
    }

    fn on_connected(
        &mut self,
        result: Result<ConnHandle, BleError>,
        radio: &mut impl RadioStack,
    ) {
        if self.phase != Phase::Connecting {
            // Nobody wants this link any more; close it without a report.
            if let Ok(conn) = result {
                if !self.is_current(conn) {
                    debug!("Late connection {}, closing", conn.0);
                    if let Err(e) = radio.terminate(conn) {
                        warn!("terminate request failed: {:?}", e);
                    }
                }
            }
            return;
        }
        self.ctx.connecting = false;
        match result {
            Ok(conn) => {
                info!("Connected, handle {}", conn.0);
                self.ctx = ConnectionContext::new();
                self.ctx.conn = Some(conn);
                self.phase = Phase::DiscoveringServices;
                if let Err(e) = radio.discover_services(conn, HandleRange::ALL) {
                    warn!("service discovery request failed: {:?}", e);
                    self.disconnect(radio);
                }
            }
            Err(e) => {
                warn!("Connection failed: {:?}", e);
                self.start_scan(radio);
            }
        }
    }

    // Discovery

    fn is_current(&self, conn: ConnHandle) -> bool {
        self.ctx.conn == Some(conn)
    }

    fn on_service_found(&mut self, conn: ConnHandle, uuid: u16, range: HandleRange) {
        if self.phase != Phase::DiscoveringServices || !self.is_current(conn) {
            return;
        }
        if let Some(kind) = ServiceKind::from_uuid16(uuid) {
            info!(
                "Service {:?} at {}..={}",
                kind,
                range.start.0,
                range.end.0
            );
            let svc = &mut self.ctx.services[kind.index()];
            svc.start = range.start;
            svc.end = range.end;
        }
    }

    fn on_services_done(
        &mut self,
        conn: ConnHandle,
        status: ProcedureStatus,
        radio: &mut impl RadioStack,
    ) {
        if self.phase != Phase::DiscoveringServices || !self.is_current(conn) {
            return;
        }
        if let ProcedureStatus::Failed(e) = status {
            warn!("Service discovery failed: {:?}", e);
            self.disconnect(radio);
            return;
        }
        let next = ServiceKind::ALL
            .into_iter()
            .find(|kind| self.ctx.service(*kind).is_found());
        match next {
            Some(kind) => self.discover_characteristics(kind, radio),
            None => {
                warn!("No service of interest on peer");
                self.disconnect(radio);
            }
        }
    }

    fn discover_characteristics(&mut self, kind: ServiceKind, radio: &mut impl RadioStack) {
        let Some(conn) = self.ctx.conn else {
            return;
        };
        self.phase = Phase::DiscoveringCharacteristics(kind);
        let range = self.ctx.service(kind).range();
        if let Err(e) = radio.discover_characteristics(conn, range) {
            warn!("characteristic discovery request failed: {:?}", e);
            self.disconnect(radio);
        }
    }

    fn on_characteristic_found(
        &mut self,
        conn: ConnHandle,
        uuid: u16,
        value_handle: AttributeHandle,
    ) {
        let Phase::DiscoveringCharacteristics(service) = self.phase else {
            return;
        };
        if !self.is_current(conn) || !self.ctx.service(service).range().contains(value_handle) {
            return;
        }
        if let Some(kind) = CharacteristicKind::classify(service, uuid) {
            info!("Characteristic {:?} value handle {}", kind, value_handle.0);
            self.ctx.characteristics[kind.index()].value_handle = value_handle;
        }
    }

    fn on_characteristics_done(
        &mut self,
        conn: ConnHandle,
        status: ProcedureStatus,
        radio: &mut impl RadioStack,
    ) {
        let Phase::DiscoveringCharacteristics(service) = self.phase else {
            return;
        };
        if !self.is_current(conn) {
            return;
        }
        if let ProcedureStatus::Failed(e) = status {
            // Keep whatever was resolved before the error.
            warn!("Characteristic discovery in {:?} failed: {:?}", service, e);
        }
        if service == ServiceKind::Environmental
            && self.ctx.service(ServiceKind::Battery).is_found()
        {
            self.discover_characteristics(ServiceKind::Battery, radio);
            return;
        }
        if !self.ctx.any_characteristic_resolved() {
            warn!("No characteristic of interest on peer");
            self.disconnect(radio);
            return;
        }
        self.read_from(0, radio);
    }

    // Read chain

    /// Issue the read for the first resolved characteristic at or after
    /// position `from` of the read order, or finish the chain.
    fn read_from(&mut self, from: usize, radio: &mut impl RadioStack) {
        let Some(conn) = self.ctx.conn else {
            return;
        };
        for kind in CharacteristicKind::READ_ORDER.into_iter().skip(from) {
            let handle = self.ctx.characteristic(kind).value_handle;
            if !handle.is_resolved() {
                continue;
            }
            self.phase = Phase::ReadingValues(kind);
            match radio.read(conn, handle) {
                Ok(()) => return,
                // Counts as a failed read; move on.
                Err(e) => warn!("{:?} read request failed: {:?}", kind, e),
            }
        }
        info!("Read chain complete");
        self.ctx.valid = true;
        self.disconnect(radio);
    }

    fn on_read_complete(
        &mut self,
        conn: ConnHandle,
        handle: AttributeHandle,
        result: Result<&[u8], BleError>,
        radio: &mut impl RadioStack,
    ) {
        let Phase::ReadingValues(kind) = self.phase else {
            return;
        };
        if !self.is_current(conn) {
            return;
        }
        match result {
            Ok(payload) if handle == self.ctx.characteristic(kind).value_handle => {
                if self.ctx.reading.store(kind, payload) {
                    debug!("{:?} read {} bytes", kind, payload.len());
                } else {
                    warn!("{:?} payload too short ({} bytes)", kind, payload.len());
                }
            }
            Ok(_) => warn!("{:?} read answered for handle {}", kind, handle.0),
            Err(e) => warn!("{:?} read failed: {:?}", kind, e),
        }
        self.read_from(kind.index() + 1, radio);
    }

    // Disconnect

    fn disconnect(&mut self, radio: &mut impl RadioStack) {
        let Some(conn) = self.ctx.conn else {
            return;
        };
        self.phase = Phase::Disconnecting;
        if let Err(e) = radio.terminate(conn) {
            warn!("terminate failed: {:?}", e);
        }
    }

    fn on_disconnected(&mut self, conn: ConnHandle, reason: u8) {
        if !self.is_current(conn) {
            debug!("Ignoring disconnect of stale handle {}", conn.0);
            return;
        }
        info!("Disconnected (reason {:#x})", reason);
        self.ctx.conn = None;
        self.ctx.connecting = false;
        self.phase = Phase::Idle;
        if self.closed {
            return;
        }
        self.closed = true;
        let report = CycleReport {
            valid: self.ctx.valid,
            reading: self.ctx.reading,
        };
        if let Some(t) = report.reading.temperature {
            info!("Temperature: {} C", t);
        }
        if let Some(h) = report.reading.humidity {
            info!("Humidity: {} %", h);
        }
        if let Some(b) = report.reading.battery {
            info!("Battery: {} %", b);
        }
        self.completion.raise(report);
    }
}
