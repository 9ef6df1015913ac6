//! Runtime settings persisted to flash.
//!
//! Record format (little-endian):
//!   `[1 version][4 acquisition period][4 cycle timeout][1 name_len][name...]`

use crate::config::{
    ACQUISITION_PERIOD_SECS, CYCLE_TIMEOUT_SECS, DEFAULT_TARGET_NAME, TARGET_NAME_MAX_LEN,
};
use heapless::String;

const RECORD_VERSION: u8 = 1;
const HEADER_LEN: usize = 1 + 4 + 4 + 1;

/// Largest serialized record.
pub const MAX_RECORD_SIZE: usize = HEADER_LEN + TARGET_NAME_MAX_LEN;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Broadcast name of the sensor to poll.
    pub target_name: String<TARGET_NAME_MAX_LEN>,
    pub acquisition_period_secs: u32,
    pub cycle_timeout_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let mut target_name = String::new();
        let _ = target_name.push_str(DEFAULT_TARGET_NAME);
        Self {
            target_name,
            acquisition_period_secs: ACQUISITION_PERIOD_SECS,
            cycle_timeout_secs: CYCLE_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Settings with a different target name. `None` if the name is empty
    /// or longer than [`TARGET_NAME_MAX_LEN`].
    pub fn with_target(name: &str) -> Option<Self> {
        let mut s = Self::default();
        s.target_name.clear();
        s.target_name.push_str(name).ok()?;
        s.is_valid().then_some(s)
    }

    pub fn is_valid(&self) -> bool {
        !self.target_name.is_empty()
            && self.acquisition_period_secs > 0
            && self.cycle_timeout_secs > 0
    }

    /// Serialize into `buf`; returns the bytes written, or 0 if `buf` is
    /// too small.
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        let name = self.target_name.as_bytes();
        let total = HEADER_LEN + name.len();
        if buf.len() < total {
            return 0;
        }
        buf[0] = RECORD_VERSION;
        buf[1..5].copy_from_slice(&self.acquisition_period_secs.to_le_bytes());
        buf[5..9].copy_from_slice(&self.cycle_timeout_secs.to_le_bytes());
        buf[9] = name.len() as u8;
        buf[HEADER_LEN..total].copy_from_slice(name);
        total
    }

    /// Parse a stored record. Anything unknown, truncated or invalid is
    /// rejected so the caller falls back to defaults.
    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN || data[0] != RECORD_VERSION {
            return None;
        }
        let acquisition_period_secs = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
        let cycle_timeout_secs = u32::from_le_bytes([data[5], data[6], data[7], data[8]]);
        let name_len = data[9] as usize;
        if name_len > TARGET_NAME_MAX_LEN || data.len() < HEADER_LEN + name_len {
            return None;
        }
        let name = core::str::from_utf8(&data[HEADER_LEN..HEADER_LEN + name_len]).ok()?;
        let mut target_name = String::new();
        target_name.push_str(name).ok()?;

        let settings = Self {
            target_name,
            acquisition_period_secs,
            cycle_timeout_secs,
        };
        settings.is_valid().then_some(settings)
    }
}
