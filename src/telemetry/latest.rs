//! Most recent reading, shared with consumers that only want the current
//! value (indicator LEDs, status logging) rather than the queue.

use crate::config::{DEFAULT_PRESSURE_HPA, FALLBACK_HUMIDITY_PCT, FALLBACK_TEMPERATURE_C};
use core::cell::Cell;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LatestReading {
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    /// False until the first successful cycle; the values above are then
    /// the configured fallbacks.
    pub has_value: bool,
}

impl LatestReading {
    pub const FALLBACK: LatestReading = LatestReading {
        temperature: FALLBACK_TEMPERATURE_C,
        humidity: FALLBACK_HUMIDITY_PCT,
        pressure: DEFAULT_PRESSURE_HPA,
        has_value: false,
    };
}

impl Default for LatestReading {
    fn default() -> Self {
        Self::FALLBACK
    }
}

pub struct SharedLatestReading {
    value: Mutex<CriticalSectionRawMutex, Cell<LatestReading>>,
}

impl SharedLatestReading {
    pub const fn new() -> Self {
        Self {
            value: Mutex::new(Cell::new(LatestReading::FALLBACK)),
        }
    }

    /// Overwrite with a fresh reading.
    pub fn update(&self, temperature: f32, humidity: f32, pressure: f32) {
        self.value.lock(|v| {
            v.set(LatestReading {
                temperature,
                humidity,
                pressure,
                has_value: true,
            })
        });
    }

    pub fn get(&self) -> LatestReading {
        self.value.lock(|v| v.get())
    }
}

impl Default for SharedLatestReading {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_fallbacks() {
        let latest = SharedLatestReading::new();
        let r = latest.get();
        assert!(!r.has_value);
        assert_eq!(r.temperature, 22.0);
        assert_eq!(r.humidity, 50.0);
        assert_eq!(r.pressure, 1013.25);
    }

    #[test]
    fn update_overwrites_in_place() {
        let latest = SharedLatestReading::new();
        latest.update(19.5, 61.0, 1002.0);
        latest.update(20.25, 58.5, 1003.5);
        let r = latest.get();
        assert!(r.has_value);
        assert_eq!(r.temperature, 20.25);
        assert_eq!(r.humidity, 58.5);
        assert_eq!(r.pressure, 1003.5);
        // Reading twice changes nothing.
        assert_eq!(latest.get(), r);
    }
}
