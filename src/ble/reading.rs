//! Decoding of characteristic values into a per-cycle reading.

use crate::ble::attributes::CharacteristicKind;

/// Values decoded during one connection. `None` means not read (or the
/// read failed / was too short).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorReading {
    /// °C
    pub temperature: Option<f32>,
    /// %RH
    pub humidity: Option<f32>,
    /// %
    pub battery: Option<u8>,
}

impl SensorReading {
    pub const fn empty() -> Self {
        Self {
            temperature: None,
            humidity: None,
            battery: None,
        }
    }

    /// Decode `payload` as a `kind` value and store it.
    ///
    /// Payloads are little-endian.  Returns `false` (and stores nothing)
    /// when the payload is shorter than the characteristic's width.
    pub fn store(&mut self, kind: CharacteristicKind, payload: &[u8]) -> bool {
        if payload.len() < kind.value_len() {
            return false;
        }
        match kind {
            CharacteristicKind::Temperature => {
                let raw = i16::from_le_bytes([payload[0], payload[1]]);
                self.temperature = Some(raw as f32 / 100.0);
            }
            CharacteristicKind::Humidity => {
                let raw = u16::from_le_bytes([payload[0], payload[1]]);
                self.humidity = Some(raw as f32 / 100.0);
            }
            CharacteristicKind::BatteryLevel => {
                self.battery = Some(payload[0]);
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none() && self.battery.is_none()
    }
}
