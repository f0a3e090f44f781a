//! Hotword detection
//!
//! Hybrid approach: local energy-gated capture picks out speech segments,
//! cloud recognition verifies whether a segment contains a wake phrase.
//! Verified wakes are reported through a callback so the listener never
//! needs to know who is coordinating turns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::voice::record::Recorder;
use crate::voice::stt::Transcriber;
use crate::Result;

/// Invoked once per verified wake
pub type WakeCallback = Arc<dyn Fn() + Send + Sync>;

/// Pause after a verified wake before listening resumes, so the detector
/// does not re-trigger on the assistant's own ding
const POST_WAKE_COOLDOWN: Duration = Duration::from_secs(3);

/// Background wake-phrase listener
pub trait HotwordDetector: Send + Sync {
    /// Start listening; `on_wake` fires once per verified wake phrase
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot start
    fn start(&self, on_wake: WakeCallback) -> Result<()>;

    /// Stop listening
    fn stop(&self);

    /// Whether the listener loop is active
    fn is_running(&self) -> bool;
}

/// Wake detection backed by segment capture plus cloud verification
pub struct SttHotword {
    wake_words: Vec<String>,
    recorder: Arc<dyn Recorder>,
    transcriber: Arc<dyn Transcriber>,
    running: Arc<AtomicBool>,
}

impl SttHotword {
    #[must_use]
    pub fn new(
        wake_words: Vec<String>,
        recorder: Arc<dyn Recorder>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        let normalized = wake_words
            .into_iter()
            .map(|w| w.to_lowercase().trim().to_string())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>();
        tracing::debug!(wake_words = ?normalized, "hotword detector initialized");

        Self {
            wake_words: normalized,
            recorder,
            transcriber,
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl HotwordDetector for SttHotword {
    fn start(&self, on_wake: WakeCallback) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("hotword detector already running");
            return Ok(());
        }

        let wake_words = self.wake_words.clone();
        let recorder = Arc::clone(&self.recorder);
        let transcriber = Arc::clone(&self.transcriber);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            tracing::info!("hotword listener started");
            while running.load(Ordering::SeqCst) {
                let segment = match recorder.record().await {
                    Ok(segment) => segment,
                    Err(e) => {
                        tracing::warn!(error = %e, "hotword capture failed, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                let transcript = match transcriber.transcribe(&segment).await {
                    Ok(transcript) => transcript,
                    Err(e) => {
                        tracing::debug!(error = %e, "hotword verification failed, ignoring segment");
                        continue;
                    }
                };

                if contains_wake_word(&wake_words, &transcript) {
                    tracing::info!(transcript = %transcript, "wake phrase detected");
                    on_wake();
                    tokio::time::sleep(POST_WAKE_COOLDOWN).await;
                }
            }
            tracing::info!("hotword listener stopped");
        });

        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Detector that never fires, for setups woken only by button or dashboard
pub struct NoopHotword;

impl HotwordDetector for NoopHotword {
    fn start(&self, _on_wake: WakeCallback) -> Result<()> {
        Ok(())
    }

    fn stop(&self) {}

    fn is_running(&self) -> bool {
        false
    }
}

/// Case-insensitive containment check against the wake list
fn contains_wake_word(wake_words: &[String], transcript: &str) -> bool {
    let normalized = transcript.to_lowercase();
    wake_words.iter().any(|w| normalized.contains(w.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_word_match_is_case_insensitive() {
        let words = vec!["小助手".to_string(), "hey hearth".to_string()];
        assert!(contains_wake_word(&words, "小助手，今天天气怎么样"));
        assert!(contains_wake_word(&words, "Hey Hearth, what's up?"));
        assert!(!contains_wake_word(&words, "今天天气怎么样"));
    }

    #[test]
    fn empty_wake_list_never_matches() {
        assert!(!contains_wake_word(&[], "anything at all"));
    }
}
