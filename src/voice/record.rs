//! Microphone recording bounded by voice activity

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Minimum RMS energy to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Silence after speech that ends the session (in samples)
const SILENCE_SAMPLES: usize = 16000; // 1 second

/// Minimum captured speech before silence can end the session (in samples)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Hard cap on one recording session (in samples)
const MAX_SESSION_SAMPLES: usize = SAMPLE_RATE as usize * 15;

/// Records one utterance, blocking until voice activity ends
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Record until silence follows speech, returning WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if the capture device fails
    async fn record(&self) -> Result<Vec<u8>>;
}

/// cpal microphone recorder with energy-based voice activity detection
pub struct CpalRecorder;

impl CpalRecorder {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for CpalRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Recorder for CpalRecorder {
    async fn record(&self) -> Result<Vec<u8>> {
        // cpal streams are not Send, so the whole session runs on a blocking
        // thread that owns the stream.
        tokio::task::spawn_blocking(record_session)
            .await
            .map_err(|e| Error::Recording(e.to_string()))?
    }
}

/// Capture one VAD-bounded session from the default input device
fn record_session() -> Result<Vec<u8>> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Recording("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Recording(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Recording("no suitable input config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(SAMPLE_RATE))
        .config();

    let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
    let stream_buffer = Arc::clone(&buffer);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = stream_buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Recording(e.to_string()))?;

    stream.play().map_err(|e| Error::Recording(e.to_string()))?;
    tracing::debug!("recording session started");

    let mut session = Vec::new();
    let mut speech_samples = 0usize;
    let mut silence_run = 0usize;

    loop {
        std::thread::sleep(std::time::Duration::from_millis(100));
        let chunk = {
            let mut buf = buffer.lock().expect("capture buffer lock");
            std::mem::take(&mut *buf)
        };
        if chunk.is_empty() {
            continue;
        }

        let energy = rms_energy(&chunk);
        if energy > ENERGY_THRESHOLD {
            speech_samples += chunk.len();
            silence_run = 0;
        } else {
            silence_run += chunk.len();
        }
        session.extend_from_slice(&chunk);

        if speech_samples > MIN_SPEECH_SAMPLES && silence_run > SILENCE_SAMPLES {
            break;
        }
        if session.len() >= MAX_SESSION_SAMPLES {
            tracing::warn!("recording session hit the hard cap");
            break;
        }
    }

    drop(stream);
    tracing::debug!(samples = session.len(), "recording session complete");
    samples_to_wav(&session, SAMPLE_RATE)
}

/// RMS energy of a sample window
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    #[allow(clippy::cast_precision_loss)]
    (sum_squares / samples.len() as f32).sqrt()
}

/// Convert f32 samples to WAV bytes for the STT API
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;
        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_of_silence_is_low() {
        let silence = vec![0.0f32; 100];
        assert!(rms_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(rms_energy(&loud) > 0.4);
    }

    #[test]
    fn samples_encode_to_valid_wav() {
        let samples = vec![0.1f32; 1600];
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();
        let reader = hound::WavReader::new(std::io::Cursor::new(&wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.len(), 1600);
    }
}
