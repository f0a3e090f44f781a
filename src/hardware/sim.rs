//! In-process hardware simulator
//!
//! Random-walk temperature and humidity on a background task, actuators
//! held as plain state. Stands in for the real bus on development machines
//! and in tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use crate::Result;

use super::{DeviceStatus, HardwareBus, SensorSnapshot};

const TEMP_RANGE: (f64, f64) = (15.0, 40.0);
const HUMIDITY_RANGE: (f64, f64) = (30.0, 90.0);
const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct SimState {
    temperature: f64,
    humidity: f64,
    flame: bool,
    smoke: bool,
    snapshot: Option<SensorSnapshot>,
    led_on: bool,
    led_brightness: u8,
    buzzer_on: bool,
    wake_edge: bool,
}

/// Simulated sensor/actuator bus
pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
    running: Arc<AtomicBool>,
}

impl SimulatedBus {
    /// Create the simulator and start its sampling task
    #[must_use]
    pub fn start() -> Self {
        let mut rng = rand::thread_rng();
        let state = Arc::new(Mutex::new(SimState {
            temperature: rng.gen_range(TEMP_RANGE.0..TEMP_RANGE.1),
            humidity: rng.gen_range(HUMIDITY_RANGE.0..HUMIDITY_RANGE.1),
            flame: false,
            smoke: false,
            snapshot: None,
            led_on: false,
            led_brightness: 100,
            buzzer_on: false,
            wake_edge: false,
        }));
        let running = Arc::new(AtomicBool::new(true));

        let task_state = Arc::clone(&state);
        let task_running = Arc::clone(&running);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
            while task_running.load(Ordering::SeqCst) {
                interval.tick().await;
                let mut rng = rand::thread_rng();
                let mut state = task_state.lock().expect("sim state lock");
                state.temperature = (state.temperature + rng.gen_range(-0.5..0.5))
                    .clamp(TEMP_RANGE.0, TEMP_RANGE.1);
                state.humidity = (state.humidity + rng.gen_range(-2.0..2.0))
                    .clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1);
                state.snapshot = Some(SensorSnapshot {
                    temperature: (state.temperature * 10.0).round() / 10.0,
                    humidity: (state.humidity * 10.0).round() / 10.0,
                    flame: state.flame,
                    smoke: state.smoke,
                    updated_at: Utc::now(),
                });
            }
            tracing::debug!("hardware simulator stopped");
        });

        tracing::info!("hardware simulator started");
        Self { state, running }
    }

    /// Inject a wake edge, as if the button had been pressed (tests)
    pub fn press_button(&self) {
        self.state.lock().expect("sim state lock").wake_edge = true;
    }

    /// Trip or clear the flame sensor, visible on the next snapshot read
    pub fn set_flame(&self, detected: bool) {
        let mut state = self.state.lock().expect("sim state lock");
        state.flame = detected;
        if let Some(snapshot) = state.snapshot.as_mut() {
            snapshot.flame = detected;
        }
    }

    /// Trip or clear the smoke sensor, visible on the next snapshot read
    pub fn set_smoke(&self, detected: bool) {
        let mut state = self.state.lock().expect("sim state lock");
        state.smoke = detected;
        if let Some(snapshot) = state.snapshot.as_mut() {
            snapshot.smoke = detected;
        }
    }
}

impl HardwareBus for SimulatedBus {
    fn sensor_snapshot(&self) -> Option<SensorSnapshot> {
        self.state.lock().expect("sim state lock").snapshot
    }

    fn device_status(&self) -> DeviceStatus {
        let state = self.state.lock().expect("sim state lock");
        DeviceStatus {
            led_on: state.led_on,
            led_brightness: state.led_brightness,
            buzzer_on: state.buzzer_on,
        }
    }

    fn set_led(&self, on: bool) -> Result<()> {
        let mut state = self.state.lock().expect("sim state lock");
        state.led_on = on;
        tracing::info!(on, "simulated LED switched");
        Ok(())
    }

    fn set_led_brightness(&self, percent: u8) -> Result<()> {
        let mut state = self.state.lock().expect("sim state lock");
        state.led_brightness = percent.clamp(1, 100);
        state.led_on = true;
        tracing::info!(brightness = state.led_brightness, "simulated LED brightness set");
        Ok(())
    }

    fn adjust_led_brightness(&self, change: i8) -> Result<u8> {
        let mut state = self.state.lock().expect("sim state lock");
        let next = (i16::from(state.led_brightness) + i16::from(change)).clamp(1, 100);
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        {
            state.led_brightness = next as u8;
        }
        state.led_on = true;
        tracing::info!(brightness = state.led_brightness, "simulated LED brightness adjusted");
        Ok(state.led_brightness)
    }

    fn blink_led(&self, times: u8) -> Result<()> {
        tracing::info!(times, "simulated LED blink");
        Ok(())
    }

    fn set_buzzer(&self, on: bool) -> Result<()> {
        let mut state = self.state.lock().expect("sim state lock");
        state.buzzer_on = on;
        tracing::info!(on, "simulated buzzer switched");
        Ok(())
    }

    fn poll_wake_edge(&self) -> bool {
        let mut state = self.state.lock().expect("sim state lock");
        std::mem::take(&mut state.wake_edge)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn actuators_track_commands() {
        let bus = SimulatedBus::start();
        bus.set_led(true).unwrap();
        bus.set_buzzer(true).unwrap();

        let status = bus.device_status();
        assert!(status.led_on);
        assert!(status.buzzer_on);
        bus.stop();
    }

    #[tokio::test]
    async fn brightness_adjustment_clamps_and_enables() {
        let bus = SimulatedBus::start();
        bus.set_led_brightness(50).unwrap();
        assert_eq!(bus.adjust_led_brightness(40).unwrap(), 90);
        assert_eq!(bus.adjust_led_brightness(40).unwrap(), 100);
        assert_eq!(bus.adjust_led_brightness(-120).unwrap(), 1);
        assert!(bus.device_status().led_on);
        bus.stop();
    }

    #[tokio::test]
    async fn tripped_sensors_show_up_in_the_snapshot() {
        let bus = SimulatedBus::start();
        while bus.sensor_snapshot().is_none() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        bus.set_flame(true);
        bus.set_smoke(true);
        let snapshot = bus.sensor_snapshot().unwrap();
        assert!(snapshot.flame);
        assert!(snapshot.smoke);

        bus.set_flame(false);
        assert!(!bus.sensor_snapshot().unwrap().flame);
        bus.stop();
    }

    #[tokio::test]
    async fn wake_edge_is_consumed_on_poll() {
        let bus = SimulatedBus::start();
        assert!(!bus.poll_wake_edge());
        bus.press_button();
        assert!(bus.poll_wake_edge());
        assert!(!bus.poll_wake_edge());
        bus.stop();
    }
}
