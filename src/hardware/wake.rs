//! Button wake edges fed into the coordinator

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::coordinator::{CoordinatorHandle, WakeSource};

use super::HardwareBus;

/// Poll cadence for the edge flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum spacing between delivered wakes (button bounce and double taps)
const DEBOUNCE: Duration = Duration::from_secs(5);

/// Watch the bus for wake edges and forward them as button wakes
pub fn spawn_wake_listener(bus: Arc<dyn HardwareBus>, coordinator: CoordinatorHandle) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        let mut last_wake: Option<Instant> = None;

        loop {
            interval.tick().await;
            if !bus.poll_wake_edge() {
                continue;
            }
            if last_wake.is_some_and(|t| t.elapsed() < DEBOUNCE) {
                tracing::debug!("wake edge within debounce window, ignored");
                continue;
            }
            last_wake = Some(Instant::now());
            tracing::info!("button wake edge");
            coordinator.wake(WakeSource::Button);
        }
    });
}
