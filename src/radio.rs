//! SoftDevice executor for the discovery machine.
//!
//! The machine never touches the SoftDevice itself: it leaves requests in a
//! [`RequestQueue`], and this task runs them one at a time as SoftDevice
//! procedures, feeding each outcome back as a [`RadioEvent`].  Commands from
//! the acquisition worker race the running procedure; a command that wins
//! drops the procedure future, which stops the scan or connection attempt
//! inside the SoftDevice.

use ble2mqtt::acquisition::CycleCommand;
use ble2mqtt::ble::attributes::{
    CharacteristicKind, ServiceKind, SERVICE_UUID_BATTERY, SERVICE_UUID_ENVIRONMENTAL,
};
use ble2mqtt::ble::discovery::DiscoveryMachine;
use ble2mqtt::ble::{
    AttributeHandle, ConnHandle, HandleRange, PeerAddress, ProcedureStatus, RadioEvent,
    RadioRequest, RequestQueue, ScanParams,
};
use ble2mqtt::config;
use ble2mqtt::BleError;
use defmt::{debug, info, warn};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;
use embassy_time::{with_timeout, Duration};
use heapless::Vec;
use nrf_softdevice::ble::gatt_client::{self, Characteristic, Descriptor, DiscoverError};
use nrf_softdevice::ble::{central, Address, AddressType, Connection, HvxType, Uuid};
use nrf_softdevice::raw;
use nrf_softdevice::Softdevice;

/// Depth of the worker → radio command channel.
pub const COMMAND_QUEUE_DEPTH: usize = 4;

/// HCI reason reported when the SoftDevice drops the link under us.
const REASON_LINK_LOST: u8 = raw::BLE_HCI_CONNECTION_TIMEOUT as u8;

/// HCI reason for a disconnect we asked for.
const REASON_LOCAL_TERMINATE: u8 = raw::BLE_HCI_LOCAL_HOST_TERMINATED_CONNECTION as u8;

/// Characteristics of one primary service, collected during discovery.
#[derive(Clone, Default)]
struct ServiceSnapshot {
    range: Option<HandleRange>,
    characteristics: Vec<(u16, AttributeHandle), 4>,
}

impl ServiceSnapshot {
    fn record(&mut self, uuid: u16, characteristic: &Characteristic) {
        let first = characteristic.handle_decl.saturating_sub(1).max(1);
        let last = characteristic
            .handle_value
            .max(characteristic.handle_cccd)
            .max(characteristic.handle_decl);
        self.range = Some(match self.range {
            Some(r) => HandleRange {
                start: AttributeHandle(r.start.0.min(first)),
                end: AttributeHandle(r.end.0.max(last)),
            },
            None => HandleRange {
                start: AttributeHandle(first),
                end: AttributeHandle(last),
            },
        });
        let _ = self
            .characteristics
            .push((uuid, AttributeHandle(characteristic.handle_value)));
    }
}

/// GATT client that only records where the interesting characteristics
/// of service `UUID` live.
struct ServiceProbe<const UUID: u16> {
    found: ServiceSnapshot,
}

impl<const UUID: u16> gatt_client::Client for ServiceProbe<UUID> {
    type Event = ();

    fn on_hvx(&self, _conn: &Connection, _type: HvxType, _handle: u16, _data: &[u8]) -> Option<()> {
        None
    }

    fn uuid() -> Uuid {
        Uuid::new_16(UUID)
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self {
            found: ServiceSnapshot::default(),
        }
    }

    fn discovered_characteristic(
        &mut self,
        characteristic: &Characteristic,
        _descriptors: &[Descriptor],
    ) {
        let Some(service) = ServiceKind::from_uuid16(UUID) else {
            return;
        };
        let known = CharacteristicKind::READ_ORDER
            .iter()
            .filter(|k| k.service() == service)
            .map(|k| k.uuid16())
            .find(|u| characteristic.uuid == Some(Uuid::new_16(*u)));
        if let Some(uuid) = known {
            self.found.record(uuid, characteristic);
        }
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        Ok(())
    }
}

/// Discover service `UUID`. `Ok(None)` when the peer does not have it.
async fn probe<const UUID: u16>(
    conn: &Connection,
) -> Result<Option<ServiceSnapshot>, DiscoverError> {
    match gatt_client::discover::<ServiceProbe<UUID>>(conn).await {
        Ok(client) => Ok(Some(client.found)),
        Err(DiscoverError::ServiceNotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

fn address_type(kind: u8) -> AddressType {
    match kind {
        0 => AddressType::Public,
        1 => AddressType::RandomStatic,
        2 => AddressType::RandomPrivateResolvable,
        3 => AddressType::RandomPrivateNonResolvable,
        _ => AddressType::Anonymous,
    }
}

fn scan_failure(e: central::ScanError) -> BleError {
    match e {
        central::ScanError::Raw(raw) => BleError::Raw(raw as u32),
        _ => BleError::ScanFailed,
    }
}

fn address_kind(address: &Address) -> u8 {
    match address.address_type() {
        AddressType::Public => 0,
        AddressType::RandomStatic => 1,
        AddressType::RandomPrivateResolvable => 2,
        AddressType::RandomPrivateNonResolvable => 3,
        AddressType::Anonymous => 4,
    }
}

struct SoftdeviceRadio {
    sd: &'static Softdevice,
    link: Option<Connection>,
    services: [ServiceSnapshot; 2],
}

impl SoftdeviceRadio {
    fn new(sd: &'static Softdevice) -> Self {
        Self {
            sd,
            link: None,
            services: [ServiceSnapshot::default(), ServiceSnapshot::default()],
        }
    }

    fn current(&self, conn: ConnHandle) -> Option<Connection> {
        self.link
            .as_ref()
            .filter(|l| l.handle() == Some(conn.0))
            .cloned()
    }

    async fn execute(
        &mut self,
        req: RadioRequest,
        machine: &mut DiscoveryMachine<'static>,
        queue: &mut RequestQueue,
    ) {
        debug!("radio: {:?}", req);
        match req {
            RadioRequest::StartScan(params) => self.scan(params, machine, queue).await,
            // Nothing is running here; the scan or connect future this
            // would stop was already dropped or has finished.
            RadioRequest::CancelScan | RadioRequest::CancelConnect => {}
            RadioRequest::Connect { peer, timeout_ms } => {
                self.connect(peer, timeout_ms, machine, queue).await
            }
            RadioRequest::DiscoverServices { conn, .. } => {
                self.discover_services(conn, machine, queue).await
            }
            RadioRequest::DiscoverCharacteristics { conn, range } => {
                self.discover_characteristics(conn, range, machine, queue)
            }
            RadioRequest::Read { conn, handle } => self.read(conn, handle, machine, queue).await,
            RadioRequest::Terminate { conn } => self.terminate(conn, machine, queue),
        }
    }

    async fn scan(
        &mut self,
        params: ScanParams,
        machine: &mut DiscoveryMachine<'static>,
        queue: &mut RequestQueue,
    ) {
        let config = central::ScanConfig {
            active: params.active,
            // 10 ms units
            timeout: (params.window_secs * 100).min(u16::MAX as u64) as u16,
            ..Default::default()
        };

        let result = central::scan(self.sd, &config, |report| {
            let data =
                unsafe { core::slice::from_raw_parts(report.data.p_data, report.data.len as usize) };
            let address = Address::from_raw(report.peer_addr);
            let peer = PeerAddress {
                kind: address_kind(&address),
                bytes: address.bytes(),
            };
            machine.handle(RadioEvent::Advertisement { peer, data }, queue);

            // The machine cancels the scan as soon as it wants to connect.
            queue
                .iter()
                .any(|r| matches!(r, RadioRequest::Connect { .. }))
                .then_some(())
        })
        .await;

        match result {
            Ok(()) => debug!("Scan stopped on target match"),
            Err(central::ScanError::Timeout) => {
                machine.handle(RadioEvent::ScanComplete, queue);
            }
            Err(e) => {
                warn!("Scan failed: {:?}", scan_failure(e));
                // Leave the retry to the cycle timeout.
            }
        }
    }

    async fn connect(
        &mut self,
        peer: PeerAddress,
        timeout_ms: u32,
        machine: &mut DiscoveryMachine<'static>,
        queue: &mut RequestQueue,
    ) {
        let address = Address::new(address_type(peer.kind), peer.bytes);
        let whitelist = [&address];
        let mut conn_config = central::ConnectConfig::default();
        conn_config.scan_config.whitelist = Some(&whitelist[..]);
        conn_config.conn_params = raw::ble_gap_conn_params_t {
            min_conn_interval: config::BLE_CONN_INTERVAL_MIN,
            max_conn_interval: config::BLE_CONN_INTERVAL_MAX,
            slave_latency: config::BLE_SLAVE_LATENCY,
            conn_sup_timeout: config::BLE_SUP_TIMEOUT,
        };

        let attempt = with_timeout(
            Duration::from_millis(timeout_ms.into()),
            central::connect(self.sd, &conn_config),
        )
        .await;

        let event = match attempt {
            Ok(Ok(link)) => match link.handle() {
                Some(handle) => {
                    info!("Connected, handle {}", handle);
                    self.link = Some(link);
                    Ok(ConnHandle(handle))
                }
                None => Err(BleError::ConnectFailed),
            },
            Ok(Err(e)) => {
                warn!("Connect failed: {:?}", e);
                Err(BleError::ConnectFailed)
            }
            Err(_) => {
                warn!("Connect timed out after {} ms", timeout_ms);
                Err(BleError::ConnectFailed)
            }
        };
        machine.handle(RadioEvent::Connected(event), queue);
    }

    async fn discover_services(
        &mut self,
        conn: ConnHandle,
        machine: &mut DiscoveryMachine<'static>,
        queue: &mut RequestQueue,
    ) {
        self.services = [ServiceSnapshot::default(), ServiceSnapshot::default()];
        let Some(link) = self.current(conn) else {
            machine.handle(
                RadioEvent::ServicesDone {
                    conn,
                    status: ProcedureStatus::Failed(BleError::DiscoveryFailed),
                },
                queue,
            );
            return;
        };

        let environmental = probe::<SERVICE_UUID_ENVIRONMENTAL>(&link).await;
        let battery = probe::<SERVICE_UUID_BATTERY>(&link).await;

        let mut status = ProcedureStatus::Done;
        for (slot, (uuid, outcome)) in [
            (SERVICE_UUID_ENVIRONMENTAL, environmental),
            (SERVICE_UUID_BATTERY, battery),
        ]
        .into_iter()
        .enumerate()
        {
            match outcome {
                Ok(Some(snapshot)) => {
                    // gatt_client reports no service bounds, so a service
                    // without any characteristic we read is left out.
                    if let Some(range) = snapshot.range {
                        machine.handle(RadioEvent::ServiceFound { conn, uuid, range }, queue);
                    }
                    self.services[slot] = snapshot;
                }
                Ok(None) => debug!("Service {:#x} not present", uuid),
                Err(e) => {
                    warn!("Service {:#x} discovery failed: {:?}", uuid, e);
                    status = ProcedureStatus::Failed(BleError::DiscoveryFailed);
                }
            }
        }

        if self.check_link(conn, machine, queue) {
            machine.handle(RadioEvent::ServicesDone { conn, status }, queue);
        }
    }

    /// Served from what service discovery already learned.
    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: HandleRange,
        machine: &mut DiscoveryMachine<'static>,
        queue: &mut RequestQueue,
    ) {
        let mut found: Vec<(u16, AttributeHandle), 4> = Vec::new();
        for snapshot in &self.services {
            for &(uuid, handle) in &snapshot.characteristics {
                if range.contains(handle) {
                    let _ = found.push((uuid, handle));
                }
            }
        }
        for (uuid, value_handle) in found {
            machine.handle(
                RadioEvent::CharacteristicFound {
                    conn,
                    uuid,
                    value_handle,
                },
                queue,
            );
        }
        machine.handle(
            RadioEvent::CharacteristicsDone {
                conn,
                status: ProcedureStatus::Done,
            },
            queue,
        );
    }

    async fn read(
        &mut self,
        conn: ConnHandle,
        handle: AttributeHandle,
        machine: &mut DiscoveryMachine<'static>,
        queue: &mut RequestQueue,
    ) {
        let mut buf = [0u8; config::BLE_READ_BUFFER_LEN];
        let result = match self.current(conn) {
            Some(link) => match gatt_client::read(&link, handle.0, &mut buf).await {
                Ok(len) => Ok(len),
                Err(e) => {
                    warn!("Read of {} failed: {:?}", handle.0, e);
                    Err(BleError::ReadFailed)
                }
            },
            None => Err(BleError::ReadFailed),
        };

        if !self.check_link(conn, machine, queue) {
            return;
        }
        let result = result.map(|len| &buf[..len.min(buf.len())]);
        machine.handle(
            RadioEvent::ReadComplete {
                conn,
                handle,
                result,
            },
            queue,
        );
    }

    fn terminate(
        &mut self,
        conn: ConnHandle,
        machine: &mut DiscoveryMachine<'static>,
        queue: &mut RequestQueue,
    ) {
        if let Some(link) = self.current(conn) {
            if let Err(e) = link.disconnect() {
                warn!("Disconnect failed: {:?}", e);
            }
        }
        self.link = None;
        machine.handle(
            RadioEvent::Disconnected {
                conn,
                reason: REASON_LOCAL_TERMINATE,
            },
            queue,
        );
    }

    /// Report a link the SoftDevice has dropped. Returns false if it is gone.
    fn check_link(
        &mut self,
        conn: ConnHandle,
        machine: &mut DiscoveryMachine<'static>,
        queue: &mut RequestQueue,
    ) -> bool {
        match self.current(conn) {
            Some(link) if link.is_connected() => true,
            _ => {
                info!("Link {} lost", conn.0);
                self.link = None;
                machine.handle(
                    RadioEvent::Disconnected {
                        conn,
                        reason: REASON_LINK_LOST,
                    },
                    queue,
                );
                false
            }
        }
    }
}

/// Own the discovery machine and run its requests on the SoftDevice.
#[embassy_executor::task]
pub async fn radio_task(
    sd: &'static Softdevice,
    mut machine: DiscoveryMachine<'static>,
    commands: Receiver<'static, CriticalSectionRawMutex, CycleCommand, COMMAND_QUEUE_DEPTH>,
) -> ! {
    let mut radio = SoftdeviceRadio::new(sd);
    let mut queue = RequestQueue::new();
    info!("Radio task started");

    loop {
        let Some(req) = queue.pop() else {
            let cmd = commands.receive().await;
            machine.apply(cmd, &mut queue);
            continue;
        };

        let outcome = select(
            commands.receive(),
            radio.execute(req, &mut machine, &mut queue),
        )
        .await;
        if let Either::First(cmd) = outcome {
            debug!("{:?} interrupted {:?}", cmd, req);
            machine.apply(cmd, &mut queue);
        }
    }
}
