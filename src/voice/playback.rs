//! Audio playback to speakers
//!
//! Playback hands out observable sound handles so the coordinator's monitor
//! loop can watch for completion and enforce its wall-clock cap.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::store::{ConfigStore, keys};
use crate::{Error, Result};

/// Sample rate for playback (matches Azure TTS PCM output)
const PLAYBACK_SAMPLE_RATE: u32 = 16000;

/// Short cue sounds played at turn boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Start-of-recording chime
    Ding,
    /// End-of-recording chime
    Dong,
    /// Startup greeting
    Welcome,
    /// Fatal exit
    Exit,
    /// Recording failed
    Quit,
    /// Recognition failed
    RecoError,
    /// Chat backend failed
    ChatError,
    /// Synthesis failed
    TtsError,
    /// Hotword detector started
    HotwordStarted,
}

impl Cue {
    /// File name of the cue inside the sound directory
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Ding => "ding.wav",
            Self::Dong => "dong.wav",
            Self::Welcome => "welcome.wav",
            Self::Exit => "exit.wav",
            Self::Quit => "quit.wav",
            Self::RecoError => "recoerror.wav",
            Self::ChatError => "chaterror.wav",
            Self::TtsError => "ttserror.wav",
            Self::HotwordStarted => "hwstartsucc.wav",
        }
    }
}

/// Handle onto one in-flight playback
pub trait ActiveSound: Send + Sync {
    /// Still producing audio
    fn is_playing(&self) -> bool;
    /// Ran to the end of its samples
    fn is_complete(&self) -> bool;
    /// Stop immediately
    fn stop(&self);
}

/// Audio output seam
pub trait Playback: Send + Sync {
    /// Play a short cue, blocking until it finishes
    ///
    /// Missing cue files degrade to a warning, never an error.
    fn play_cue(&self, cue: Cue) -> Result<()>;

    /// Start playing WAV bytes, returning an observable handle
    ///
    /// # Errors
    ///
    /// Returns error if decoding or the output device fails
    fn play_wav(&self, data: Vec<u8>) -> Result<Arc<dyn ActiveSound>>;

    /// Start playing an audio file (WAV or MP3 by extension)
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or decoded
    fn play_file(&self, path: &Path) -> Result<Arc<dyn ActiveSound>>;

    /// Start playing an audio file at an explicit volume instead of the
    /// stored general volume (music uses its own volume key)
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or decoded
    fn play_file_at(&self, path: &Path, volume: f32) -> Result<Arc<dyn ActiveSound>>;
}

/// Playback handle state shared with the output thread
struct SoundState {
    finished: AtomicBool,
    stopped: AtomicBool,
}

struct SoundHandle {
    state: Arc<SoundState>,
}

impl ActiveSound for SoundHandle {
    fn is_playing(&self) -> bool {
        !self.state.finished.load(Ordering::SeqCst) && !self.state.stopped.load(Ordering::SeqCst)
    }

    fn is_complete(&self) -> bool {
        self.state.finished.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
    }
}

/// Plays audio to the default output device via cpal
pub struct CpalPlayback {
    sound_dir: PathBuf,
    store: Arc<ConfigStore>,
}

impl CpalPlayback {
    /// Create a playback instance rooted at the cue sound directory
    #[must_use]
    pub fn new(sound_dir: PathBuf, store: Arc<ConfigStore>) -> Self {
        Self { sound_dir, store }
    }

    fn volume(&self) -> f32 {
        #[allow(clippy::cast_possible_truncation)]
        let v = self.store.get_f64(keys::GENERAL_VOLUME).unwrap_or(0.5) as f32;
        v.clamp(0.0, 1.0)
    }

    fn start_samples(&self, samples: Vec<f32>) -> Result<Arc<dyn ActiveSound>> {
        self.start_samples_at(samples, self.volume())
    }

    fn start_samples_at(&self, samples: Vec<f32>, volume: f32) -> Result<Arc<dyn ActiveSound>> {
        let state = Arc::new(SoundState {
            finished: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });
        let thread_state = Arc::clone(&state);
        let volume = volume.clamp(0.0, 1.0);

        // cpal streams are not Send; the output thread owns the stream for
        // its whole lifetime and reports back through the shared state.
        std::thread::spawn(move || {
            if let Err(e) = output_thread(&samples, volume, &thread_state) {
                tracing::error!(error = %e, "audio playback failed");
                thread_state.finished.store(true, Ordering::SeqCst);
            }
        });

        Ok(Arc::new(SoundHandle { state }))
    }
}

impl Playback for CpalPlayback {
    fn play_cue(&self, cue: Cue) -> Result<()> {
        let path = self.sound_dir.join(cue.file_name());
        if !path.exists() {
            tracing::warn!(cue = ?cue, path = %path.display(), "cue file missing, skipping");
            return Ok(());
        }

        let handle = self.play_file(&path)?;
        // Cues are short; poll until done
        while handle.is_playing() {
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        Ok(())
    }

    fn play_wav(&self, data: Vec<u8>) -> Result<Arc<dyn ActiveSound>> {
        let samples = decode_wav(&data)?;
        self.start_samples(samples)
    }

    fn play_file(&self, path: &Path) -> Result<Arc<dyn ActiveSound>> {
        self.play_file_at(path, self.volume())
    }

    fn play_file_at(&self, path: &Path, volume: f32) -> Result<Arc<dyn ActiveSound>> {
        let data = std::fs::read(path)?;
        let samples = if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("mp3")) {
            decode_mp3(&data)?
        } else {
            decode_wav(&data)?
        };
        self.start_samples_at(samples, volume)
    }
}

/// Run one cpal output stream to completion
fn output_thread(samples: &[f32], volume: f32, state: &Arc<SoundState>) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config();
    let channels = config.channels as usize;

    let samples = samples.to_vec();
    let position = Arc::new(std::sync::Mutex::new(0usize));
    let stream_state = Arc::clone(state);
    let stream_position = Arc::clone(&position);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = stream_position.lock().expect("position lock");
                for frame in data.chunks_mut(channels) {
                    let sample = if *pos < samples.len() {
                        let s = samples[*pos] * volume;
                        *pos += 1;
                        s
                    } else {
                        stream_state.finished.store(true, Ordering::SeqCst);
                        0.0
                    };
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio output stream error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    while !state.finished.load(Ordering::SeqCst) && !state.stopped.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    // Let the tail drain before tearing the stream down
    std::thread::sleep(std::time::Duration::from_millis(100));
    drop(stream);
    state.finished.store(true, Ordering::SeqCst);
    Ok(())
}

/// Decode WAV bytes to mono f32 samples
fn decode_wav(data: &[u8]) -> Result<Vec<f32>> {
    let mut reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .filter_map(std::result::Result::ok)
            .map(|s| f32::from(s) / 32768.0)
            .collect(),
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .filter_map(std::result::Result::ok)
            .collect(),
    };

    if spec.channels <= 1 {
        return Ok(samples);
    }
    // Downmix to mono
    let channels = spec.channels as usize;
    Ok(samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect())
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cue_file_names_are_stable() {
        assert_eq!(Cue::Ding.file_name(), "ding.wav");
        assert_eq!(Cue::RecoError.file_name(), "recoerror.wav");
    }

    #[test]
    fn decode_wav_round_trip() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..100i16 {
                writer.write_sample(i * 100).unwrap();
            }
            writer.finalize().unwrap();
        }

        let samples = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(samples.len(), 100);
        assert!(samples[0].abs() < 0.001);
        assert!(samples[99] > 0.2);
    }
}
