//! One conversation turn, start to finish
//!
//! Stages: capture input, check special phrases and local intents, get the
//! reply spoken. The interrupt permit is checked at every stage boundary;
//! a cleared permit unwinds the turn with an `Aborted` outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::intents;
use crate::store::keys;
use crate::voice::{ActiveSound, Cue, Playback};

use super::{Collaborators, CoordinatorHandle, TurnOutcome};

/// Where this turn's utterance comes from
#[derive(Debug, Clone)]
pub enum TurnInput {
    /// Record from the microphone
    Record,
    /// Injected text, no audio involved
    Text(String),
    /// Re-recognize the last recorded utterance without re-recording
    LastAudio,
}

pub(super) fn spawn_turn(
    collab: &Collaborators,
    streaming: bool,
    input: TurnInput,
    permit: Arc<AtomicBool>,
    last_audio: Arc<Mutex<Option<Vec<u8>>>>,
    reply_sound: Arc<Mutex<Option<Arc<dyn ActiveSound>>>>,
    handle: CoordinatorHandle,
) {
    let turn = Turn {
        collab: collab.clone(),
        streaming,
        permit,
        last_audio,
        reply_sound,
    };

    tokio::spawn(async move {
        let outcome = turn.run(input).await;
        handle.turn_finished(outcome);
    });
}

struct Turn {
    collab: Collaborators,
    streaming: bool,
    permit: Arc<AtomicBool>,
    last_audio: Arc<Mutex<Option<Vec<u8>>>>,
    reply_sound: Arc<Mutex<Option<Arc<dyn ActiveSound>>>>,
}

impl Turn {
    fn interrupted(&self) -> bool {
        !self.permit.load(Ordering::SeqCst)
    }

    async fn run(&self, input: TurnInput) -> TurnOutcome {
        // Stage 1: input
        let text = match self.capture_input(input).await {
            Ok(Some(text)) => text,
            Ok(None) => return TurnOutcome::Aborted,
            Err(outcome) => return outcome,
        };
        tracing::info!(text = %text, "turn input");

        if self.interrupted() {
            return TurnOutcome::Aborted;
        }

        // Stage 2: special phrases, then local intents
        if intents::is_end_phrase(&text) {
            tracing::info!("end phrase, closing conversation");
            self.stop_reply();
            self.collab.store.set(keys::CHAT_ENABLE, false);
            return TurnOutcome::Aborted;
        }
        if intents::is_exit_phrase(&text) {
            tracing::info!("exit phrase");
            return TurnOutcome::ExitRequested;
        }
        match intents::dispatch(&self.collab.intents, &text).await {
            Ok(true) => return TurnOutcome::Handled,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(error = %e, "intent handler failed");
                self.cue(Cue::ChatError).await;
                return TurnOutcome::Failed;
            }
        }

        if self.interrupted() {
            return TurnOutcome::Aborted;
        }

        // Stage 3: chat reply
        self.reply(&text).await
    }

    /// Resolve the turn input to text, or `None` when nothing was said
    async fn capture_input(&self, input: TurnInput) -> Result<Option<String>, TurnOutcome> {
        let audio = match input {
            TurnInput::Text(text) => return Ok(Some(text)),
            TurnInput::LastAudio => {
                let stashed = self.last_audio.lock().expect("last audio lock").clone();
                match stashed {
                    Some(audio) => {
                        tracing::info!("re-recognizing last recording");
                        audio
                    }
                    None => self.record().await?,
                }
            }
            TurnInput::Record => self.record().await?,
        };

        if self.interrupted() {
            return Ok(None);
        }

        match self.collab.transcriber.transcribe(&audio).await {
            Ok(text) if text.trim().is_empty() => {
                tracing::info!("nothing recognized");
                Ok(None)
            }
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                tracing::warn!(error = %e, "recognition failed");
                self.cue(Cue::RecoError).await;
                Err(TurnOutcome::Failed)
            }
        }
    }

    async fn record(&self) -> Result<Vec<u8>, TurnOutcome> {
        self.cue(Cue::Ding).await;
        match self.collab.recorder.record().await {
            Ok(audio) => {
                self.cue(Cue::Dong).await;
                *self.last_audio.lock().expect("last audio lock") = Some(audio.clone());
                Ok(audio)
            }
            Err(e) => {
                tracing::warn!(error = %e, "recording failed");
                self.cue(Cue::Quit).await;
                Err(TurnOutcome::Failed)
            }
        }
    }

    async fn reply(&self, text: &str) -> TurnOutcome {
        let reply = match self.collab.backend.send(text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "chat backend failed");
                self.cue(Cue::ChatError).await;
                return TurnOutcome::Failed;
            }
        };
        if self.interrupted() {
            return TurnOutcome::Aborted;
        }
        self.collab.store.set(keys::ANSWER, reply.clone());

        if self.streaming {
            // Streamed replies are already spoken by the pipeline
            return TurnOutcome::Completed;
        }

        // Batch mode: synthesize the whole reply and hand playback to the
        // monitor loop
        let audio = match self.collab.synthesizer.synthesize(&reply).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::error!(error = %e, "reply synthesis failed");
                self.cue(Cue::TtsError).await;
                return TurnOutcome::Failed;
            }
        };
        if self.interrupted() {
            return TurnOutcome::Aborted;
        }

        self.cue(Cue::Ding).await;
        match self.collab.playback.play_wav(audio) {
            Ok(sound) => {
                *self.reply_sound.lock().expect("reply sound lock") = Some(sound);
                TurnOutcome::Completed
            }
            Err(e) => {
                tracing::error!(error = %e, "reply playback failed");
                self.cue(Cue::TtsError).await;
                TurnOutcome::Failed
            }
        }
    }

    /// Silence whatever reply is still being spoken
    ///
    /// The stopped sound stays in place for the monitor to clean up.
    fn stop_reply(&self) {
        if let Some(sound) = self.reply_sound.lock().expect("reply sound lock").as_ref() {
            sound.stop();
        }
        self.collab.backend.cancel_stream();
    }

    async fn cue(&self, cue: Cue) {
        let playback = Arc::clone(&self.collab.playback);
        let joined = tokio::task::spawn_blocking(move || playback.play_cue(cue)).await;
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(?cue, error = %e, "cue playback failed"),
            Err(e) => tracing::warn!(?cue, error = %e, "cue playback task failed"),
        }
    }
}
