//! Voice processing module
//!
//! Audio capture, hotword detection, Azure speech recognition and
//! synthesis, and playback with observable sound handles.

mod hotword;
mod playback;
mod record;
mod stt;
mod tts;
mod tts_stream;

pub use hotword::{HotwordDetector, NoopHotword, SttHotword, WakeCallback};
pub use playback::{ActiveSound, CpalPlayback, Cue, Playback};
pub use record::{CpalRecorder, Recorder, SAMPLE_RATE, samples_to_wav};
pub use stt::{AzureStt, Transcriber};
pub use tts::{AzureTts, Synthesizer};
pub use tts_stream::SpeechPipeline;
