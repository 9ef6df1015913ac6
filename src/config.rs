//! Application-wide constants and compile-time configuration.
//!
//! All timing parameters, queue sizing, and fallback values live here so
//! they can be tuned in one place.  Values that may change per deployment
//! are mirrored in [`crate::settings::Settings`] and persisted to flash.

// BLE

/// Broadcast name of the sensor peripheral we poll.
pub const DEFAULT_TARGET_NAME: &str = "ATC_8E4B89";

/// Maximum broadcast name length we keep (bytes).
pub const TARGET_NAME_MAX_LEN: usize = 32;

/// Timeout for a single connection attempt (milliseconds).
///
/// Covers several advertising intervals, which are not
/// under our control.
pub const BLE_CONNECT_TIMEOUT_MS: u32 = 30_000;

/// Duration of a single scan window before it is restarted (seconds).
pub const BLE_SCAN_WINDOW_SECS: u64 = 10;

/// BLE connection interval range (in 1.25 ms units).
/// A relaxed interval is fine for three attribute reads.
pub const BLE_CONN_INTERVAL_MIN: u16 = 24;
pub const BLE_CONN_INTERVAL_MAX: u16 = 40;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

/// Largest attribute value we copy out of a read response.
pub const BLE_READ_BUFFER_LEN: usize = 8;

// Acquisition

/// Period between acquisition cycles (seconds).
pub const ACQUISITION_PERIOD_SECS: u32 = 30;

/// How long the worker waits for one full scan/connect/read cycle (seconds).
pub const CYCLE_TIMEOUT_SECS: u32 = 30;

/// Back-off while provisioning mode holds the radio (milliseconds).
pub const PROVISIONING_POLL_MS: u64 = 1_000;

/// Fallback temperature before any reading arrives (°C).
pub const FALLBACK_TEMPERATURE_C: f32 = 22.0;

/// Fallback relative humidity before any reading arrives (%RH).
pub const FALLBACK_HUMIDITY_PCT: f32 = 50.0;

/// Sea-level pressure used when no barometer is fitted (hPa).
pub const DEFAULT_PRESSURE_HPA: f32 = 1013.25;

// Telemetry queue & delivery

/// Maximum number of buffered telemetry samples.
pub const TELEMETRY_QUEUE_CAPACITY: usize = 1000;

/// Maximum samples handed to the uplink in one publish.
pub const DELIVERY_BATCH_SIZE: usize = 50;

/// Serialized payload budget for one batch (bytes).
/// A worst-case JSON object is ~105 bytes plus one separator.
pub const DELIVERY_PAYLOAD_CAPACITY: usize = 112 * DELIVERY_BATCH_SIZE + 2;

/// Interval between queue drain attempts (seconds).
pub const DELIVERY_INTERVAL_SECS: u64 = 30;

/// Pause between consecutive batches of one drain pass (milliseconds).
pub const DELIVERY_BATCH_PAUSE_MS: u64 = 100;

/// Timeout for the co-processor to acknowledge a publish (milliseconds).
pub const UPLINK_ACK_TIMEOUT_MS: u64 = 5_000;

// GPIO pin assignments (nRF52840-DK defaults)
//
// These are logical names; actual `embassy_nrf::peripherals::*` types are
// selected in `main.rs`.  Adjust for your custom PCB.
//
//   Provisioning button → P0.11 (Button 1)
//   Presence sensor     → P0.03
//   Network link-up     → P0.04
//   Uplink UART TX / RX → P0.06 / P0.08
//   Indicator LEDs      → P0.13, P0.14, P0.15

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 50;

/// Hold time that toggles provisioning mode (ms).
pub const PROVISIONING_LONG_PRESS_MS: u64 = 3_000;

/// Indicator refresh period (ms).
pub const INDICATOR_REFRESH_MS: u64 = 2_000;

// Settings storage

/// Flash page index where settings storage starts (4 KB per page on nRF52840).
pub const STORAGE_FLASH_PAGE_START: u32 = 240;

/// Number of flash pages reserved for settings storage.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 4;
