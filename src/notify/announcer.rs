//! Spoken announcements outside of conversation turns
//!
//! Announcements follow the `notify_enable` protocol: claim the flag, ding,
//! speak, release. Intent handlers and the hourly chime both go through
//! here so they never talk over a conversation turn.

use std::sync::Arc;
use std::time::Duration;

use crate::store::{ConfigStore, keys};
use crate::voice::{Cue, Playback, Synthesizer};
use crate::Result;

/// Longest a single announcement may play before being cut off
const PLAYBACK_CAP: Duration = Duration::from_secs(30);

/// Speaks short texts through the notify protocol
pub struct Announcer {
    store: Arc<ConfigStore>,
    playback: Arc<dyn Playback>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl Announcer {
    #[must_use]
    pub fn new(
        store: Arc<ConfigStore>,
        playback: Arc<dyn Playback>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            store,
            playback,
            synthesizer,
        }
    }

    /// Speak one text: ding, synthesize, play to completion
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails; `notify_enable` is
    /// released either way
    pub async fn announce(&self, text: &str) -> Result<()> {
        self.announce_many(std::slice::from_ref(&text.to_string()))
            .await
    }

    /// Speak several texts in sequence under one notify claim
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    pub async fn announce_many(&self, parts: &[String]) -> Result<()> {
        self.store.set(keys::ANSWER, parts.join(""));
        self.store.set(keys::NOTIFY_ENABLE, true);

        let result = self.speak_all(parts).await;

        self.store.set(keys::NOTIFY_ENABLE, false);
        result
    }

    async fn speak_all(&self, parts: &[String]) -> Result<()> {
        let playback = Arc::clone(&self.playback);
        tokio::task::spawn_blocking(move || playback.play_cue(Cue::Ding))
            .await
            .map_err(|e| crate::Error::Audio(e.to_string()))??;

        for text in parts {
            let audio = self.synthesizer.synthesize(text).await?;
            let sound = self.playback.play_wav(audio)?;

            let started = std::time::Instant::now();
            while sound.is_playing() {
                if started.elapsed() > PLAYBACK_CAP {
                    tracing::warn!("announcement hit the playback cap, stopping");
                    sound.stop();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
        Ok(())
    }
}
