//! Scheduled announcements
//!
//! The notifier watches the clock and plays the cached hourly chime on
//! minute zero, deferring whenever a conversation or another announcement
//! holds the audio resource. The fire alarm watcher polls the hardware bus
//! and sounds the cached warning the moment a sensor trips.

mod alarm;
mod announcer;
mod cache;

pub use alarm::spawn_alarm_watcher;
pub use announcer::Announcer;
pub use cache::{VoiceCache, hour_file, hour_phrase};

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};

use crate::store::{ConfigStore, keys};
use crate::voice::{Cue, Playback};

/// Clock poll cadence
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Longest a chime may play before being cut off
const CHIME_CAP: Duration = Duration::from_secs(20);

/// Spawn the hourly chime loop
pub fn spawn_notifier(
    store: Arc<ConfigStore>,
    playback: Arc<dyn Playback>,
    cache: Arc<VoiceCache>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        let mut last_hour = None;

        loop {
            interval.tick().await;
            let now = Local::now();
            if now.minute() != 0 || !store.get_bool(keys::TIME_NOTIFY) {
                continue;
            }
            let hour = now.hour();
            if last_hour == Some(hour) {
                continue;
            }
            last_hour = Some(hour);

            if store.get_bool(keys::CHAT_ENABLE) || store.get_bool(keys::NOTIFY_ENABLE) {
                tracing::debug!(hour, "audio busy, skipping hourly chime");
                continue;
            }
            tracing::info!(hour, "hourly chime");

            let path = match cache.ensure(&hour_file(hour), &hour_phrase(hour)).await {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot produce chime audio, skipping");
                    continue;
                }
            };

            store.set(keys::NOTIFY_ENABLE, true);
            play_announcement(&playback, &path, CHIME_CAP).await;
            store.set(keys::NOTIFY_ENABLE, false);
        }
    });
}

/// Ding, then the announcement file, cut off at `cap`
async fn play_announcement(playback: &Arc<dyn Playback>, path: &std::path::Path, cap: Duration) {
    let ding = Arc::clone(playback);
    match tokio::task::spawn_blocking(move || ding.play_cue(Cue::Ding)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "announcement ding failed"),
        Err(e) => tracing::warn!(error = %e, "announcement ding task failed"),
    }

    let sound = match playback.play_file(path) {
        Ok(sound) => sound,
        Err(e) => {
            tracing::warn!(error = %e, "announcement playback failed");
            return;
        }
    };

    let started = std::time::Instant::now();
    while sound.is_playing() {
        if started.elapsed() > cap {
            tracing::warn!("announcement hit the playback cap, stopping");
            sound.stop();
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
