//! Conversation coordinator
//!
//! A channel-fed actor owns the conversation state machine. Wake events,
//! injected commands, and turn completions arrive as messages; a 500ms
//! monitor tick drives playback watching, turn startup, and the stacked
//! interruption rules. Nothing else in the daemon mutates conversation
//! state directly.

mod turn;

pub use turn::TurnInput;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::chat::ChatBackend;
use crate::intents::IntentHandler;
use crate::store::{ConfigStore, keys};
use crate::voice::{ActiveSound, Cue, Playback, Recorder, Synthesizer, Transcriber};

/// Monitor cadence
const TICK: Duration = Duration::from_millis(500);

/// Reply playback is cut off after this many monitor ticks (~85s)
const PLAYBACK_TICK_CAP: u32 = 170;

/// Conversation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    /// Nothing in flight
    Idle,
    /// Woken, a turn will start on the next tick
    WakeActivated,
    /// Woken while a turn was in flight; the old turn is being stopped
    RunActivated,
    /// Woken again before the interrupted turn stopped; fatal
    Error,
    /// Orderly shutdown requested
    Shutdown,
}

/// Where a wake came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    Hotword,
    Button,
    Peripheral,
    Dashboard,
    Phrase,
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Reply produced (and, in streaming mode, fully spoken)
    Completed,
    /// Turn stopped early: interruption, end phrase, or nothing heard
    Aborted,
    /// A local intent handler served the turn
    Handled,
    /// A stage failed; its error cue has been played
    Failed,
    /// The exit phrase was spoken
    ExitRequested,
}

/// Messages into the coordinator
#[derive(Debug)]
enum Event {
    Wake(WakeSource),
    Command(String),
    TurnFinished(TurnOutcome),
    Shutdown,
}

/// Terminates the process; a seam so tests observe exits instead of dying
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

/// Real process exit
pub struct RealExit;

impl ProcessExit for RealExit {
    fn exit(&self, code: i32) {
        tracing::info!(code, "terminating");
        std::process::exit(code);
    }
}

/// Cloneable sender half of the coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Event>,
}

impl CoordinatorHandle {
    /// Deliver a wake event
    pub fn wake(&self, source: WakeSource) {
        if self.tx.try_send(Event::Wake(source)).is_err() {
            tracing::warn!(?source, "coordinator queue full, wake dropped");
        }
    }

    /// Deliver an injected command or free text
    pub fn command(&self, text: String) {
        if self.tx.try_send(Event::Command(text)).is_err() {
            tracing::warn!("coordinator queue full, command dropped");
        }
    }

    /// Request orderly shutdown
    pub fn shutdown(&self) {
        if self.tx.try_send(Event::Shutdown).is_err() {
            tracing::warn!("coordinator queue full, shutdown dropped");
        }
    }

    fn turn_finished(&self, outcome: TurnOutcome) {
        if self.tx.try_send(Event::TurnFinished(outcome)).is_err() {
            tracing::error!("coordinator queue full, turn outcome lost");
        }
    }
}

/// Everything a turn task needs, bundled for spawning
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<ConfigStore>,
    pub backend: Arc<dyn ChatBackend>,
    pub recorder: Arc<dyn Recorder>,
    pub transcriber: Arc<dyn Transcriber>,
    pub playback: Arc<dyn Playback>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub intents: Arc<Vec<Box<dyn IntentHandler>>>,
    pub exit: Arc<dyn ProcessExit>,
}

/// Coordinator tuning
pub struct CoordinatorConfig {
    /// Replies are streamed into speech rather than synthesized whole
    pub streaming: bool,
    /// Re-listen automatically after each completed reply
    pub continuous_dialog: bool,
}

/// Spawn the coordinator actor
#[must_use]
pub fn spawn(collab: Collaborators, config: CoordinatorConfig) -> CoordinatorHandle {
    let (tx, rx) = mpsc::channel(32);
    let handle = CoordinatorHandle { tx };

    let actor = Coordinator {
        collab,
        config,
        handle: handle.clone(),
        state: ChatState::Idle,
        running: false,
        permit: Arc::new(AtomicBool::new(true)),
        pending_input: None,
        next_dialog: false,
        last_audio: Arc::new(Mutex::new(None)),
        reply_sound: Arc::new(Mutex::new(None)),
        playback_ticks: 0,
    };
    tokio::spawn(actor.run(rx));
    handle
}

struct Coordinator {
    collab: Collaborators,
    config: CoordinatorConfig,
    handle: CoordinatorHandle,
    state: ChatState,
    /// A turn task is in flight
    running: bool,
    /// Cleared to interrupt the in-flight turn at its next stage boundary
    permit: Arc<AtomicBool>,
    /// Input for the next turn, when not recording from the microphone
    pending_input: Option<TurnInput>,
    /// A follow-up turn should start once the reply finishes playing
    next_dialog: bool,
    /// Last recorded utterance, for re-recognition without re-recording
    last_audio: Arc<Mutex<Option<Vec<u8>>>>,
    /// Batch-mode reply playback being watched by the monitor
    reply_sound: Arc<Mutex<Option<Arc<dyn ActiveSound>>>>,
    playback_ticks: u32,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::Receiver<Event>) {
        tracing::info!("coordinator started");
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    self.handle_event(event);
                }
                _ = tick.tick() => {
                    self.monitor_tick().await;
                }
            }
            if self.state == ChatState::Shutdown {
                break;
            }
        }

        if let Err(e) = self.collab.backend.save() {
            tracing::error!(error = %e, "failed to persist history on shutdown");
        }
        tracing::info!("coordinator stopped");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Wake(source) => self.handle_wake(source),
            Event::Command(text) => self.handle_command(text),
            Event::TurnFinished(outcome) => self.handle_turn_finished(outcome),
            Event::Shutdown => {
                tracing::info!("shutdown requested");
                self.stop_reply_sound();
                self.collab.backend.cancel_stream();
                self.state = ChatState::Shutdown;
            }
        }
    }

    /// Stacked-interruption wake rules
    fn handle_wake(&mut self, source: WakeSource) {
        tracing::info!(?source, state = ?self.state, "wake");
        if self.running && !self.permit.load(Ordering::SeqCst) {
            // Woken again while the previous interruption is still being
            // unwound: give up rather than pile up turns
            tracing::error!("stacked interruption, entering error state");
            self.state = ChatState::Error;
        } else if self.running {
            self.permit.store(false, Ordering::SeqCst);
            self.collab.backend.cancel_stream();
            self.stop_reply_sound();
            self.state = ChatState::RunActivated;
        } else {
            self.state = ChatState::WakeActivated;
        }
    }

    /// Injected commands from the store poller and the dashboard
    fn handle_command(&mut self, text: String) {
        match text.as_str() {
            "wake" => self.handle_wake(WakeSource::Dashboard),
            "get_audio_complete" => {
                self.pending_input = Some(TurnInput::LastAudio);
                self.handle_wake(WakeSource::Dashboard);
            }
            "shutdown" => self.handle_event(Event::Shutdown),
            "stop" => {
                tracing::info!("hotword detector disabled by command");
                self.collab.store.set(keys::WAKE_BY_HW, false);
            }
            "start" => {
                tracing::info!("hotword detector enabled by command");
                self.collab.store.set(keys::WAKE_BY_HW, true);
            }
            _ => {
                tracing::info!(text = %text, "free-text command");
                self.pending_input = Some(TurnInput::Text(text));
                self.handle_wake(WakeSource::Dashboard);
            }
        }
    }

    fn handle_turn_finished(&mut self, outcome: TurnOutcome) {
        tracing::info!(?outcome, "turn finished");
        self.running = false;

        match outcome {
            TurnOutcome::Completed => {
                if self.state != ChatState::RunActivated && self.state != ChatState::Error {
                    self.state = ChatState::Idle;
                }
                if self.config.continuous_dialog {
                    self.next_dialog = true;
                }
            }
            TurnOutcome::Aborted | TurnOutcome::Handled | TurnOutcome::Failed => {
                if self.state != ChatState::RunActivated && self.state != ChatState::Error {
                    self.state = ChatState::Idle;
                }
                self.collab.store.set(keys::CHAT_ENABLE, false);
            }
            TurnOutcome::ExitRequested => {
                if let Err(e) = self.collab.backend.save() {
                    tracing::error!(error = %e, "failed to persist history before exit");
                }
                self.collab.exit.exit(0);
                self.state = ChatState::Shutdown;
            }
        }
    }

    async fn monitor_tick(&mut self) {
        match self.state {
            ChatState::Error => {
                let playback = Arc::clone(&self.collab.playback);
                let joined =
                    tokio::task::spawn_blocking(move || playback.play_cue(Cue::Exit)).await;
                if !matches!(joined, Ok(Ok(()))) {
                    tracing::warn!("exit cue playback failed");
                }
                if let Err(e) = self.collab.backend.save() {
                    tracing::error!(error = %e, "failed to persist history before exit");
                }
                self.collab.exit.exit(1);
                self.state = ChatState::Shutdown;
            }
            ChatState::RunActivated => {
                // Wait for the interrupted turn to unwind, then re-arm
                if !self.running {
                    self.permit.store(true, Ordering::SeqCst);
                    self.state = ChatState::WakeActivated;
                }
            }
            ChatState::WakeActivated => {
                if !self.running && !self.collab.store.get_bool(keys::NOTIFY_ENABLE) {
                    self.start_turn();
                }
            }
            ChatState::Idle => {
                self.watch_reply_playback();
                self.release_audio_claim();
            }
            ChatState::Shutdown => {}
        }
    }

    fn start_turn(&mut self) {
        let input = self.pending_input.take().unwrap_or(TurnInput::Record);
        tracing::info!(?input, "starting turn");
        self.collab.store.set(keys::CHAT_ENABLE, true);
        self.running = true;
        self.next_dialog = false;
        self.state = ChatState::Idle;
        self.permit.store(true, Ordering::SeqCst);

        turn::spawn_turn(
            &self.collab,
            self.config.streaming,
            input,
            Arc::clone(&self.permit),
            Arc::clone(&self.last_audio),
            Arc::clone(&self.reply_sound),
            self.handle.clone(),
        );
    }

    /// Watch the batch-mode reply playback and enforce the wall-clock cap
    fn watch_reply_playback(&mut self) {
        let finished = {
            let sound = self.reply_sound.lock().expect("reply sound lock");
            match sound.as_ref() {
                Some(sound) if sound.is_playing() => {
                    self.playback_ticks += 1;
                    if self.playback_ticks > PLAYBACK_TICK_CAP {
                        tracing::warn!("reply playback hit the cap, stopping");
                        sound.stop();
                        true
                    } else {
                        false
                    }
                }
                Some(_) => true,
                None => false,
            }
        };

        if finished {
            *self.reply_sound.lock().expect("reply sound lock") = None;
            self.playback_ticks = 0;
            if self.next_dialog {
                tracing::info!("reply finished, continuing dialog");
                self.state = ChatState::WakeActivated;
            }
        }
    }

    /// Drop the audio claim once everything has gone quiet
    fn release_audio_claim(&mut self) {
        if self.running {
            return;
        }
        let sound_active = self
            .reply_sound
            .lock()
            .expect("reply sound lock")
            .is_some();
        if sound_active || !self.collab.backend.synthesis_complete() {
            return;
        }

        if self.next_dialog {
            // Streaming mode: speech is done, re-listen straight away
            tracing::info!("reply spoken, continuing dialog");
            self.state = ChatState::WakeActivated;
            return;
        }
        if self.collab.store.get_bool(keys::CHAT_ENABLE) {
            self.collab.store.set(keys::CHAT_ENABLE, false);
        }
    }

    fn stop_reply_sound(&self) {
        let sound = self.reply_sound.lock().expect("reply sound lock");
        if let Some(sound) = sound.as_ref() {
            sound.stop();
        }
    }
}
