//! Local user interface - one button, one presence input, three LEDs.
//!
//! ## Components
//!
//! - **Buttons**: provisioning long-press and the presence sensor edge
//!   counter, both active-edge with debouncing.
//! - **LEDs**: humidity zone indicator driven from the latest reading.

pub mod buttons;
pub mod leds;
