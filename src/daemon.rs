//! Daemon wiring
//!
//! Builds every collaborator, spawns the background loops, and runs until
//! a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::api::{ApiServer, ApiState};
use crate::chat::{ChatBackend, ChatClient, ChatHistory};
use crate::config::Config;
use crate::coordinator::{self, Collaborators, CoordinatorConfig, CoordinatorHandle, RealExit, WakeSource};
use crate::hardware::{HardwareBus, SimulatedBus, spawn_wake_listener};
use crate::intents::{
    ClimateIntent, DeviceIntent, IntentHandler, MusicClient, MusicIntent, TimeIntent,
    WeatherClient,
};
use crate::notify::{Announcer, VoiceCache, spawn_alarm_watcher, spawn_notifier};
use crate::store::{ConfigStore, keys};
use crate::voice::{
    AzureStt, AzureTts, CpalPlayback, CpalRecorder, Cue, HotwordDetector, Playback, Recorder,
    SpeechPipeline, SttHotword, Synthesizer, Transcriber,
};
use crate::Result;

/// Cadence of the injected-command poller
const COMMAND_POLL: Duration = Duration::from_millis(500);

/// Cadence of the hotword supervisor reconciling desired vs actual state
const HOTWORD_POLL: Duration = Duration::from_secs(1);

/// The assembled daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// Returns error if a collaborator fails to initialize
    pub async fn run(self) -> Result<()> {
        let config = self.config;

        let store = Arc::new(ConfigStore::new());
        store.audit_to_file(&config.audit_log_path());
        store.set(keys::WAKE_BY_HW, config.wake.hotword);
        store.set(keys::HW_STARTED, false);

        // Voice stack
        let playback: Arc<dyn Playback> =
            Arc::new(CpalPlayback::new(config.sound_dir.clone(), Arc::clone(&store)));
        let recorder: Arc<dyn Recorder> = Arc::new(CpalRecorder::new());
        let transcriber: Arc<dyn Transcriber> = Arc::new(AzureStt::new(&config.azure)?);
        let synthesizer: Arc<dyn Synthesizer> = Arc::new(AzureTts::new(&config.azure)?);

        // Chat backend
        let (tokens_tx, _) = broadcast::channel(64);
        let history = ChatHistory::load(
            config.chat.system_prompt.clone(),
            config.chat.token_threshold,
            config.history_path(),
        );
        let pipeline = if config.chat.streaming {
            Some(Arc::new(SpeechPipeline::new(
                Arc::clone(&synthesizer),
                Arc::clone(&playback),
            )))
        } else {
            None
        };
        let backend: Arc<dyn ChatBackend> = Arc::new(ChatClient::new(
            config.chat.clone(),
            history,
            pipeline,
            tokens_tx.clone(),
        ));

        // Hardware and announcements
        let bus: Arc<dyn HardwareBus> = Arc::new(SimulatedBus::start());
        let announcer = Arc::new(Announcer::new(
            Arc::clone(&store),
            Arc::clone(&playback),
            Arc::clone(&synthesizer),
        ));
        let cache = Arc::new(VoiceCache::new(
            config.sound_dir.clone(),
            Arc::clone(&synthesizer),
        ));

        // Intent handlers, in priority order
        let mut handlers: Vec<Box<dyn IntentHandler>> = Vec::new();
        if config.devices_enabled {
            handlers.push(Box::new(DeviceIntent::new(
                Arc::clone(&bus),
                Arc::clone(&announcer),
            )?));
        }
        if config.music.enabled {
            handlers.push(Box::new(MusicIntent::new(
                Arc::clone(&store),
                Arc::clone(&announcer),
                Arc::clone(&playback),
                MusicClient::new(config.music.api_url.clone()),
                config.sound_dir.clone(),
            )?));
        }
        handlers.push(Box::new(TimeIntent::new(
            Arc::clone(&store),
            Arc::clone(&announcer),
            WeatherClient::new(&config.weather),
        )?));
        handlers.push(Box::new(ClimateIntent::new(
            Arc::clone(&bus),
            Arc::clone(&announcer),
        )));

        // Coordinator
        let coordinator = coordinator::spawn(
            Collaborators {
                store: Arc::clone(&store),
                backend: Arc::clone(&backend),
                recorder: Arc::clone(&recorder),
                transcriber: Arc::clone(&transcriber),
                playback: Arc::clone(&playback),
                synthesizer: Arc::clone(&synthesizer),
                intents: Arc::new(handlers),
                exit: Arc::new(RealExit),
            },
            CoordinatorConfig {
                streaming: config.chat.streaming,
                continuous_dialog: config.wake.continuous_dialog,
            },
        );

        // Background loops
        spawn_command_poller(Arc::clone(&store), coordinator.clone());
        spawn_notifier(Arc::clone(&store), Arc::clone(&playback), Arc::clone(&cache));
        spawn_alarm_watcher(Arc::clone(&bus), Arc::clone(&playback), Arc::clone(&cache));
        if config.wake.gpio {
            spawn_wake_listener(Arc::clone(&bus), coordinator.clone());
        }
        spawn_hotword_supervisor(
            Arc::clone(&store),
            Arc::new(SttHotword::new(
                config.wake.wake_words.clone(),
                Arc::clone(&recorder),
                Arc::clone(&transcriber),
            )),
            Arc::clone(&playback),
            coordinator.clone(),
        );

        // Dashboard
        let api_state = ApiState::new(
            Arc::clone(&store),
            coordinator.clone(),
            Arc::clone(&bus),
            tokens_tx,
        );
        let server = ApiServer::new(api_state, config.server.port, config.server.static_dir.clone());
        let server_task = server.spawn();

        // Startup greeting
        {
            let playback = Arc::clone(&playback);
            if let Err(e) =
                tokio::task::spawn_blocking(move || playback.play_cue(Cue::Welcome)).await
            {
                tracing::warn!(error = %e, "welcome cue task failed");
            }
        }
        tracing::info!("daemon up");

        wait_for_shutdown().await;

        // Orderly teardown: silence hardware, let the coordinator persist
        tracing::info!("shutting down");
        bus.stop();
        coordinator.shutdown();
        tokio::time::sleep(Duration::from_millis(700)).await;
        server_task.abort();
        Ok(())
    }
}

/// Poll the store's `command` key and feed the coordinator
fn spawn_command_poller(store: Arc<ConfigStore>, coordinator: CoordinatorHandle) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(COMMAND_POLL);
        loop {
            interval.tick().await;
            if let Some(command) = store.take_command() {
                tracing::debug!(command = %command, "command picked up");
                coordinator.command(command);
            }
        }
    });
}

/// Reconcile the hotword detector's actual state with the desired
/// `wakebyhw` flag
fn spawn_hotword_supervisor(
    store: Arc<ConfigStore>,
    detector: Arc<SttHotword>,
    playback: Arc<dyn Playback>,
    coordinator: CoordinatorHandle,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HOTWORD_POLL);
        loop {
            interval.tick().await;
            let desired = store.get_bool(keys::WAKE_BY_HW);
            let actual = detector.is_running();
            if desired == actual {
                continue;
            }

            if desired {
                let wake = coordinator.clone();
                let started = detector.start(Arc::new(move || {
                    wake.wake(WakeSource::Hotword);
                }));
                match started {
                    Ok(()) => {
                        store.set(keys::HW_STARTED, true);
                        let playback = Arc::clone(&playback);
                        let _ = tokio::task::spawn_blocking(move || {
                            playback.play_cue(Cue::HotwordStarted)
                        })
                        .await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "hotword detector failed to start");
                        store.set(keys::WAKE_BY_HW, false);
                    }
                }
            } else {
                detector.stop();
                store.set(keys::HW_STARTED, false);
            }
        }
    });
}

/// Block until SIGINT or SIGTERM
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received"),
            _ = sigterm.recv() => tracing::info!("SIGTERM received"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
