//! Humidity indicator on three discrete LEDs (active-low, as on the DK).

use ble2mqtt::config::INDICATOR_REFRESH_MS;
use ble2mqtt::indicator::{IndicatorConfig, Rgb};
use ble2mqtt::telemetry::latest::SharedLatestReading;
use defmt::debug;
use embassy_nrf::gpio::Output;
use embassy_time::{Duration, Timer};

/// Red, green and blue outputs, in that order.
pub struct IndicatorLeds {
    channels: [Output<'static>; 3],
}

impl IndicatorLeds {
    pub fn new(red: Output<'static>, green: Output<'static>, blue: Output<'static>) -> Self {
        Self {
            channels: [red, green, blue],
        }
    }

    fn show(&mut self, color: Rgb) {
        for (led, on) in self.channels.iter_mut().zip(color.channels_on()) {
            if on {
                led.set_low();
            } else {
                led.set_high();
            }
        }
    }
}

#[embassy_executor::task]
pub async fn indicator_task(
    mut leds: IndicatorLeds,
    latest: &'static SharedLatestReading,
    config: IndicatorConfig,
) -> ! {
    let mut shown = None;
    loop {
        let color = config.color_for_reading(&latest.get());
        if shown != Some(color) {
            debug!("Indicator -> {:?}", color);
            leds.show(color);
            shown = Some(color);
        }
        Timer::after(Duration::from_millis(INDICATOR_REFRESH_MS)).await;
    }
}
