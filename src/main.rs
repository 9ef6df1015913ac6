//! ble2mqtt firmware entry point (nRF52840 + S140 SoftDevice).
//!
//! Task layout:
//!
//! - `softdevice_task` - SoftDevice event pump.
//! - `radio_task` - owns the discovery machine, runs its requests.
//! - `acquisition_task` - one scan/connect/read cycle per period.
//! - `delivery_task` - drains the telemetry queue over the UART uplink.
//! - `link_task`, `provisioning_button_task`, `presence_task`,
//!   `indicator_task` - GPIO plumbing around the shared state.
//!
//! All cross-task state lives in one static [`Shared`].

#![no_std]
#![no_main]

mod radio;
mod serial;
mod storage;
mod ui;

use ble2mqtt::acquisition::{AcquisitionWorker, ChannelControl, CycleCommand, NoBarometer};
use ble2mqtt::ble::discovery::DiscoveryMachine;
use ble2mqtt::config::TELEMETRY_QUEUE_CAPACITY;
use ble2mqtt::delivery::DeliveryWorker;
use ble2mqtt::indicator::IndicatorConfig;
use ble2mqtt::shared::Shared;
use defmt::{error, info, warn};
use embassy_executor::{SpawnError, Spawner};
use embassy_nrf::gpio::{Level, Output, OutputDrive, Pin};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::{bind_interrupts, peripherals, uarte};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use nrf_softdevice::{raw, Softdevice};
use radio::COMMAND_QUEUE_DEPTH;
use serial::SerialUplink;
use ui::leds::IndicatorLeds;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    UARTE0_UART0 => uarte::InterruptHandler<peripherals::UARTE0>;
});

static SHARED: Shared<TELEMETRY_QUEUE_CAPACITY> = Shared::new();

static COMMANDS: Channel<CriticalSectionRawMutex, CycleCommand, COMMAND_QUEUE_DEPTH> =
    Channel::new();

type Acquisition = AcquisitionWorker<
    'static,
    ChannelControl<'static, COMMAND_QUEUE_DEPTH>,
    NoBarometer,
    TELEMETRY_QUEUE_CAPACITY,
>;

type Delivery = DeliveryWorker<'static, SerialUplink, TELEMETRY_QUEUE_CAPACITY>;

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn acquisition_task(mut worker: Acquisition) -> ! {
    worker.run().await
}

#[embassy_executor::task]
async fn delivery_task(mut worker: Delivery) -> ! {
    worker.run().await
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 64 }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 0,
            central_role_count: 1,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        ..Default::default()
    }
}

fn spawned(name: &str, result: Result<(), SpawnError>) {
    if result.is_err() {
        error!("Failed to spawn {=str}", name);
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("ble2mqtt starting");

    // The SoftDevice reserves priorities 0, 1 and 4.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);
    interrupt::UARTE0_UART0.set_priority(Priority::P3);

    let sd = Softdevice::enable(&softdevice_config());
    spawned("softdevice", spawner.spawn(softdevice_task(sd)));

    let settings = {
        let mut flash = nrf_softdevice::Flash::take(sd);
        storage::load_or_init(&mut flash).await
    };

    let mut machine = DiscoveryMachine::new(&SHARED.completion);
    if machine
        .set_target(settings.target_name.as_bytes())
        .is_err()
    {
        warn!("Stored target name rejected, keeping the default");
    }
    spawned(
        "radio",
        spawner.spawn(radio::radio_task(sd, machine, COMMANDS.receiver())),
    );

    let acquisition = AcquisitionWorker::new(
        ChannelControl::new(COMMANDS.sender()),
        NoBarometer,
        &SHARED,
        &settings,
    );
    spawned("acquisition", spawner.spawn(acquisition_task(acquisition)));

    let uarte = uarte::Uarte::new(
        p.UARTE0,
        Irqs,
        p.P0_08,
        p.P0_06,
        uarte::Config::default(),
    );
    let delivery = DeliveryWorker::new(
        SerialUplink::new(uarte, &SHARED.clock),
        &SHARED.queue,
        &SHARED.link,
    );
    spawned("delivery", spawner.spawn(delivery_task(delivery)));
    spawned(
        "link",
        spawner.spawn(serial::link_task(p.P0_04.degrade(), &SHARED.link)),
    );

    spawned(
        "provisioning button",
        spawner.spawn(ui::buttons::provisioning_button_task(
            p.P0_11.degrade(),
            &SHARED.provisioning,
        )),
    );
    spawned(
        "presence",
        spawner.spawn(ui::buttons::presence_task(
            p.P0_03.degrade(),
            &SHARED.detections,
        )),
    );

    let leds = IndicatorLeds::new(
        Output::new(p.P0_13, Level::High, OutputDrive::Standard),
        Output::new(p.P0_14, Level::High, OutputDrive::Standard),
        Output::new(p.P0_15, Level::High, OutputDrive::Standard),
    );
    spawned(
        "indicator",
        spawner.spawn(ui::leds::indicator_task(
            leds,
            &SHARED.latest,
            IndicatorConfig::default(),
        )),
    );

    info!(
        "All tasks running, polling {=str} every {} s",
        settings.target_name.as_str(),
        settings.acquisition_period_secs
    );
}
