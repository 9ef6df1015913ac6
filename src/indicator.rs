//! Humidity indicator: maps the latest humidity onto one of three colour
//! zones.

use crate::telemetry::latest::LatestReading;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    pub const GREEN: Rgb = Rgb { r: 0, g: 255, b: 0 };
    pub const BLUE: Rgb = Rgb { r: 0, g: 0, b: 255 };
    pub const OFF: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// On/off state of discrete red, green and blue LEDs approximating
    /// this colour.
    pub fn channels_on(self) -> [bool; 3] {
        [self.r >= 128, self.g >= 128, self.b >= 128]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HumidityZone {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndicatorConfig {
    /// Below this is `Low` (%RH).
    pub low_medium: f32,
    /// At or above this is `High` (%RH).
    pub medium_high: f32,
    /// Colour per zone, indexed Low, Medium, High.
    pub colors: [Rgb; 3],
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            low_medium: 30.0,
            medium_high: 70.0,
            colors: [Rgb::RED, Rgb::BLUE, Rgb::GREEN],
        }
    }
}

impl IndicatorConfig {
    pub fn zone(&self, humidity: f32) -> HumidityZone {
        if humidity < self.low_medium {
            HumidityZone::Low
        } else if humidity < self.medium_high {
            HumidityZone::Medium
        } else {
            HumidityZone::High
        }
    }

    pub fn color_for(&self, humidity: f32) -> Rgb {
        let idx = match self.zone(humidity) {
            HumidityZone::Low => 0,
            HumidityZone::Medium => 1,
            HumidityZone::High => 2,
        };
        self.colors[idx]
    }

    /// Colour to show for `latest`; dark until a real reading exists.
    pub fn color_for_reading(&self, latest: &LatestReading) -> Rgb {
        if !latest.has_value {
            return Rgb::OFF;
        }
        self.color_for(latest.humidity)
    }
}
