//! GPIO inputs with async debouncing.
//!
//!   - PROVISION - active-low button; holding it for
//!     [`PROVISIONING_LONG_PRESS_MS`] toggles provisioning mode.
//!   - PRESENCE  - PIR-style output; every debounced rising edge counts
//!     one detection.

use ble2mqtt::config::{BUTTON_DEBOUNCE_MS, PROVISIONING_LONG_PRESS_MS};
use ble2mqtt::detections::DetectionCounter;
use ble2mqtt::provisioning::{long_press_reached, ProvisioningFlag};
use defmt::{debug, info};
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_time::{with_timeout, Duration, Instant, Timer};

/// Toggle provisioning mode on every long press.
///
/// The toggle fires as soon as the hold time is reached, not on release,
/// so the user gets feedback while still holding the button.
#[embassy_executor::task]
pub async fn provisioning_button_task(pin: AnyPin, flag: &'static ProvisioningFlag) -> ! {
    let mut btn = Input::new(pin, Pull::Up);
    let debounce = Duration::from_millis(BUTTON_DEBOUNCE_MS);

    loop {
        // Wait for falling edge (button press, active-low).
        btn.wait_for_falling_edge().await;
        Timer::after(debounce).await;
        if !btn.is_low() {
            continue;
        }

        let pressed_at = Instant::now();
        let hold = Duration::from_millis(PROVISIONING_LONG_PRESS_MS);
        let released = with_timeout(hold, btn.wait_for_rising_edge()).await;
        let held_ms = pressed_at.elapsed().as_millis();

        if released.is_ok() || !long_press_reached(held_ms, PROVISIONING_LONG_PRESS_MS) {
            debug!("Short press ({} ms) ignored", held_ms);
            Timer::after(debounce).await;
            continue;
        }

        let active = flag.toggle();
        info!(
            "Provisioning mode {}",
            if active { "entered" } else { "left" }
        );

        // Wait for release to avoid repeat triggers.
        btn.wait_for_rising_edge().await;
        Timer::after(debounce).await;
    }
}

/// Count presence detections for the next telemetry sample.
#[embassy_executor::task]
pub async fn presence_task(pin: AnyPin, counter: &'static DetectionCounter) -> ! {
    let mut sensor = Input::new(pin, Pull::Down);
    let debounce = Duration::from_millis(BUTTON_DEBOUNCE_MS);

    loop {
        sensor.wait_for_rising_edge().await;
        Timer::after(debounce).await;
        if sensor.is_high() {
            counter.increment();
            debug!("Presence detected ({} pending)", counter.peek());
            sensor.wait_for_falling_edge().await;
        }
    }
}
