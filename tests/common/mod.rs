//! Shared test doubles for the daemon's collaborator seams

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use hearth::chat::ChatBackend;
use hearth::coordinator::{Collaborators, ProcessExit};
use hearth::intents::IntentHandler;
use hearth::store::ConfigStore;
use hearth::voice::{ActiveSound, Cue, Playback, Recorder, Synthesizer, Transcriber};
use hearth::{Error, Result};

/// Recorder returning scripted results, then silence-shaped dummies
pub struct FakeRecorder {
    queue: Mutex<VecDeque<std::result::Result<Vec<u8>, String>>>,
}

impl FakeRecorder {
    pub fn scripted(results: Vec<std::result::Result<Vec<u8>, String>>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(results.into()),
        })
    }

    pub fn always_ok() -> Arc<Self> {
        Self::scripted(Vec::new())
    }
}

#[async_trait]
impl Recorder for FakeRecorder {
    async fn record(&self) -> Result<Vec<u8>> {
        match self.queue.lock().unwrap().pop_front() {
            Some(Ok(audio)) => Ok(audio),
            Some(Err(msg)) => Err(Error::Recording(msg)),
            None => Ok(vec![0u8; 16]),
        }
    }
}

/// Transcriber returning scripted results, then empty transcripts
pub struct FakeTranscriber {
    queue: Mutex<VecDeque<std::result::Result<String, String>>>,
}

impl FakeTranscriber {
    pub fn scripted(results: Vec<std::result::Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(results.into()),
        })
    }

    pub fn silent() -> Arc<Self> {
        Self::scripted(Vec::new())
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
        match self.queue.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(Error::Stt(msg)),
            None => Ok(String::new()),
        }
    }
}

/// Sound handle whose completion the test controls
pub struct FakeSound {
    complete: AtomicBool,
    stopped: AtomicBool,
}

impl FakeSound {
    pub fn finish(&self) {
        self.complete.store(true, Ordering::SeqCst);
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl ActiveSound for FakeSound {
    fn is_playing(&self) -> bool {
        !self.complete.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Playback that records every cue and hands out controllable sounds
#[derive(Default)]
pub struct FakePlayback {
    cues: Mutex<Vec<Cue>>,
    sounds: Mutex<Vec<Arc<FakeSound>>>,
}

impl FakePlayback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cues(&self) -> Vec<Cue> {
        self.cues.lock().unwrap().clone()
    }

    pub fn sounds(&self) -> Vec<Arc<FakeSound>> {
        self.sounds.lock().unwrap().clone()
    }

    fn new_sound(&self) -> Arc<dyn ActiveSound> {
        let sound = Arc::new(FakeSound {
            complete: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });
        self.sounds.lock().unwrap().push(Arc::clone(&sound));
        sound
    }
}

impl Playback for FakePlayback {
    fn play_cue(&self, cue: Cue) -> Result<()> {
        self.cues.lock().unwrap().push(cue);
        Ok(())
    }

    fn play_wav(&self, _data: Vec<u8>) -> Result<Arc<dyn ActiveSound>> {
        Ok(self.new_sound())
    }

    fn play_file(&self, _path: &Path) -> Result<Arc<dyn ActiveSound>> {
        Ok(self.new_sound())
    }

    fn play_file_at(&self, _path: &Path, _volume: f32) -> Result<Arc<dyn ActiveSound>> {
        Ok(self.new_sound())
    }
}

/// Chat backend with scripted replies and observable control calls
pub struct FakeBackend {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    sent: Mutex<Vec<String>>,
    cancels: AtomicUsize,
    saves: AtomicUsize,
    delay: Duration,
    synthesis_done: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    /// A backend whose `send` takes this long, for interruption tests
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            delay,
            synthesis_done: AtomicBool::new(true),
        })
    }

    pub fn queue_reply(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_synthesis_done(&self, done: bool) {
        self.synthesis_done.store(done, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn send(&self, text: &str) -> Result<String> {
        self.sent.lock().unwrap().push(text.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(msg)) => Err(Error::Chat(msg)),
            None => Ok("好的。".to_string()),
        }
    }

    fn cancel_stream(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn synthesis_complete(&self) -> bool {
        self.synthesis_done.load(Ordering::SeqCst)
    }

    fn save(&self) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Synthesizer returning a fixed payload
pub struct FakeSynthesizer;

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
        Ok(b"RIFF-test".to_vec())
    }
}

/// Exit seam that records codes instead of terminating
#[derive(Default)]
pub struct FakeExit {
    codes: Mutex<Vec<i32>>,
}

impl FakeExit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().unwrap().clone()
    }
}

impl ProcessExit for FakeExit {
    fn exit(&self, code: i32) {
        self.codes.lock().unwrap().push(code);
    }
}

/// Intent handler matching one exact phrase, counting its hits
pub struct PhraseIntent {
    phrase: &'static str,
    hits: Arc<AtomicUsize>,
}

impl PhraseIntent {
    pub fn new(phrase: &'static str) -> (Self, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        (
            Self {
                phrase,
                hits: Arc::clone(&hits),
            },
            hits,
        )
    }
}

#[async_trait]
impl IntentHandler for PhraseIntent {
    fn name(&self) -> &'static str {
        "phrase"
    }

    async fn detect(&self, text: &str) -> Result<bool> {
        if text == self.phrase {
            self.hits.fetch_add(1, Ordering::SeqCst);
            return Ok(true);
        }
        Ok(false)
    }
}

/// One full set of fake collaborators
pub struct TestBed {
    pub store: Arc<ConfigStore>,
    pub backend: Arc<FakeBackend>,
    pub recorder: Arc<FakeRecorder>,
    pub transcriber: Arc<FakeTranscriber>,
    pub playback: Arc<FakePlayback>,
    pub exit: Arc<FakeExit>,
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBed {
    pub fn new() -> Self {
        Self {
            store: Arc::new(ConfigStore::new()),
            backend: FakeBackend::new(),
            recorder: FakeRecorder::always_ok(),
            transcriber: FakeTranscriber::silent(),
            playback: FakePlayback::new(),
            exit: FakeExit::new(),
        }
    }

    pub fn collaborators(&self, intents: Vec<Box<dyn IntentHandler>>) -> Collaborators {
        Collaborators {
            store: Arc::clone(&self.store),
            backend: self.backend.clone(),
            recorder: self.recorder.clone(),
            transcriber: self.transcriber.clone(),
            playback: self.playback.clone(),
            synthesizer: Arc::new(FakeSynthesizer),
            intents: Arc::new(intents),
            exit: self.exit.clone(),
        }
    }
}

/// Poll a condition until it holds or the timeout elapses
pub async fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
