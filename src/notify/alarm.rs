//! Fire alarm watcher
//!
//! Polls flame and smoke readings off the hardware bus and sounds the
//! cached warning phrase when either trips. Alarms are rate-limited so a
//! persistent reading does not loop the warning back to back, and unlike
//! the chime they do not defer to an active conversation.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::cache::{ALARM_FILE, ALARM_PHRASE, VoiceCache};
use super::play_announcement;
use crate::hardware::HardwareBus;
use crate::voice::Playback;

/// Sensor poll cadence
const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum gap between two alarms
const ALARM_COOLDOWN: Duration = Duration::from_secs(60);

/// Longest the alarm may play before being cut off
const ALARM_CAP: Duration = Duration::from_secs(20);

/// Spawn the fire alarm loop
pub fn spawn_alarm_watcher(
    bus: Arc<dyn HardwareBus>,
    playback: Arc<dyn Playback>,
    cache: Arc<VoiceCache>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHECK_INTERVAL);
        let mut last_alarm: Option<Instant> = None;

        loop {
            interval.tick().await;
            let Some(snapshot) = bus.sensor_snapshot() else {
                continue;
            };
            if !snapshot.flame && !snapshot.smoke {
                continue;
            }
            if last_alarm.is_some_and(|at| at.elapsed() < ALARM_COOLDOWN) {
                continue;
            }
            last_alarm = Some(Instant::now());
            tracing::warn!(
                flame = snapshot.flame,
                smoke = snapshot.smoke,
                "fire risk detected, sounding alarm"
            );

            let path = match cache.ensure(ALARM_FILE, ALARM_PHRASE).await {
                Ok(path) => path,
                Err(e) => {
                    tracing::error!(error = %e, "cannot produce alarm audio");
                    continue;
                }
            };
            play_announcement(&playback, &path, ALARM_CAP).await;
        }
    });
}
