//! Sentence-level speech pipeline fed by streaming chat replies
//!
//! The chat client pushes text fragments as they arrive from the backend.
//! The pipeline buffers them, cuts at sentence boundaries, synthesizes each
//! sentence and plays it while the next one is already being synthesized,
//! so speech starts well before the full reply exists.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::voice::playback::{ActiveSound, Playback};
use crate::voice::tts::Synthesizer;

/// How long the pipeline waits for the next fragment before speaking
/// whatever is buffered
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Characters that end a speakable sentence
const SENTENCE_TERMINATORS: &[char] = &['。', '！', '？', '；', '.', '!', '?', ';'];

/// One pipeline input
enum Segment {
    /// A reply fragment
    Text(String),
    /// The reply is complete; speak the remainder and go idle
    End,
}

/// Streaming text-to-speech pipeline
pub struct SpeechPipeline {
    tx: mpsc::Sender<Segment>,
    stop: Arc<AtomicBool>,
    idle: Arc<AtomicBool>,
    current: Arc<Mutex<Option<Arc<dyn ActiveSound>>>>,
}

impl SpeechPipeline {
    /// Spawn the pipeline task
    #[must_use]
    pub fn new(synthesizer: Arc<dyn Synthesizer>, playback: Arc<dyn Playback>) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let stop = Arc::new(AtomicBool::new(false));
        let idle = Arc::new(AtomicBool::new(true));
        let current = Arc::new(Mutex::new(None));

        let worker = Worker {
            synthesizer,
            playback,
            stop: Arc::clone(&stop),
            idle: Arc::clone(&idle),
            current: Arc::clone(&current),
        };
        tokio::spawn(worker.run(rx));

        Self {
            tx,
            stop,
            idle,
            current,
        }
    }

    /// Feed a reply fragment
    pub async fn feed(&self, text: impl Into<String>) {
        self.idle.store(false, Ordering::SeqCst);
        if self.tx.send(Segment::Text(text.into())).await.is_err() {
            tracing::error!("speech pipeline task is gone");
        }
    }

    /// Mark the reply complete; the pipeline goes idle once everything
    /// buffered has been spoken
    pub async fn end(&self) {
        if self.tx.send(Segment::End).await.is_err() {
            tracing::error!("speech pipeline task is gone");
        }
    }

    /// Discard buffered text and cut off the sound currently playing
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Ok(current) = self.current.lock() {
            if let Some(sound) = current.as_ref() {
                sound.stop();
            }
        }
    }

    /// Nothing buffered, nothing playing
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    /// Block (async) until the pipeline has spoken everything fed so far
    pub async fn wait_idle(&self) {
        while !self.is_idle() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

struct Worker {
    synthesizer: Arc<dyn Synthesizer>,
    playback: Arc<dyn Playback>,
    stop: Arc<AtomicBool>,
    idle: Arc<AtomicBool>,
    current: Arc<Mutex<Option<Arc<dyn ActiveSound>>>>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Segment>) {
        let mut buffer = String::new();

        loop {
            let segment = match tokio::time::timeout(FLUSH_TIMEOUT, rx.recv()).await {
                Ok(Some(segment)) => segment,
                Ok(None) => break,
                Err(_) => {
                    // Backend has stalled; speak what we have rather than
                    // holding the user in silence
                    if !buffer.is_empty() {
                        let pending = std::mem::take(&mut buffer);
                        self.speak(&pending).await;
                    }
                    continue;
                }
            };

            match segment {
                Segment::Text(text) => {
                    if self.stop.load(Ordering::SeqCst) {
                        buffer.clear();
                        continue;
                    }
                    buffer.push_str(&text);
                    while let Some(sentence) = take_sentence(&mut buffer) {
                        self.speak(&sentence).await;
                    }
                }
                Segment::End => {
                    if !self.stop.load(Ordering::SeqCst) && !buffer.is_empty() {
                        let pending = std::mem::take(&mut buffer);
                        self.speak(&pending).await;
                    }
                    buffer.clear();
                    self.stop.store(false, Ordering::SeqCst);
                    self.idle.store(true, Ordering::SeqCst);
                }
            }
        }
        tracing::debug!("speech pipeline task finished");
    }

    /// Synthesize one sentence and play it to completion
    async fn speak(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() || self.stop.load(Ordering::SeqCst) {
            return;
        }

        let audio = match self.synthesizer.synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::error!(error = %e, "sentence synthesis failed, skipping");
                return;
            }
        };
        if self.stop.load(Ordering::SeqCst) {
            return;
        }

        let sound = match self.playback.play_wav(audio) {
            Ok(sound) => sound,
            Err(e) => {
                tracing::error!(error = %e, "sentence playback failed, skipping");
                return;
            }
        };
        if let Ok(mut current) = self.current.lock() {
            *current = Some(Arc::clone(&sound));
        }

        while sound.is_playing() {
            if self.stop.load(Ordering::SeqCst) {
                sound.stop();
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

/// Split the first complete sentence off the front of the buffer
fn take_sentence(buffer: &mut String) -> Option<String> {
    let end = buffer
        .char_indices()
        .find(|(_, c)| SENTENCE_TERMINATORS.contains(c))
        .map(|(i, c)| i + c.len_utf8())?;
    let rest = buffer.split_off(end);
    let sentence = std::mem::replace(buffer, rest);
    Some(sentence)
}
