//! Hardware access behind a capability trait
//!
//! Sensors and actuators sit behind [`HardwareBus`] so the rest of the
//! daemon never touches pins or brokers directly. The default
//! implementation is an in-process simulator; a deployment with real
//! peripherals swaps in its own bus. Failures degrade to the last known
//! reading and are never fatal.

mod sim;
mod wake;

pub use sim::SimulatedBus;
pub use wake::spawn_wake_listener;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Result;

/// One environment reading
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SensorSnapshot {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity percent
    pub humidity: f64,
    /// Flame sensor tripped
    pub flame: bool,
    /// Smoke sensor tripped
    pub smoke: bool,
    /// When the reading was taken
    pub updated_at: DateTime<Utc>,
}

/// Actuator state as reported to the dashboard
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeviceStatus {
    pub led_on: bool,
    /// LED brightness percent (1-100)
    pub led_brightness: u8,
    pub buzzer_on: bool,
}

/// Sensor and actuator access
pub trait HardwareBus: Send + Sync {
    /// Latest sensor reading, if any has been taken
    fn sensor_snapshot(&self) -> Option<SensorSnapshot>;

    /// Current actuator state
    fn device_status(&self) -> DeviceStatus;

    /// Turn the LED on or off
    ///
    /// # Errors
    ///
    /// Returns error if the actuator cannot be reached
    fn set_led(&self, on: bool) -> Result<()>;

    /// Set LED brightness to an absolute percent, turning it on if needed
    ///
    /// # Errors
    ///
    /// Returns error if the actuator cannot be reached
    fn set_led_brightness(&self, percent: u8) -> Result<()>;

    /// Adjust LED brightness by a signed step, clamped to 1-100
    ///
    /// Returns the resulting brightness.
    ///
    /// # Errors
    ///
    /// Returns error if the actuator cannot be reached
    fn adjust_led_brightness(&self, change: i8) -> Result<u8>;

    /// Blink the LED a number of times
    ///
    /// # Errors
    ///
    /// Returns error if the actuator cannot be reached
    fn blink_led(&self, times: u8) -> Result<()>;

    /// Turn the buzzer on or off
    ///
    /// # Errors
    ///
    /// Returns error if the actuator cannot be reached
    fn set_buzzer(&self, on: bool) -> Result<()>;

    /// Whether a wake edge (button press) occurred since the last poll
    fn poll_wake_edge(&self) -> bool;

    /// Stop background sampling
    fn stop(&self);
}
