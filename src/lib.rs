//! Hardware-independent half of the ble2mqtt firmware.
//!
//! Everything the acquisition pipeline needs apart from the radio, GPIO
//! and UART drivers lives here so it can be unit tested on the host:
//!
//! - [`ble`]: advertisement parsing, the attribute directory and the
//!   scan/connect/discover/read state machine.
//! - [`sync_bridge`]: the completion rendezvous between the radio task and
//!   the acquisition worker.
//! - [`telemetry`]: samples, the bounded queue and the latest-value cache.
//! - [`acquisition`] and [`delivery`]: the two worker loops.
//!
//! Usage: `cargo test --lib` (host), `cargo run --release --features
//! embedded` (target).
//!
//! Note: the embedded binary uses main.rs with #![no_std] and #![no_main].

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
mod fmt;

pub mod acquisition;
pub mod ble;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod detections;
pub mod error;
pub mod indicator;
pub mod provisioning;
pub mod settings;
pub mod shared;
pub mod sync_bridge;
pub mod telemetry;
pub mod uplink;

pub use error::{BleError, Error};
