//! Text-to-speech via the Azure REST synthesis endpoint

use std::path::Path;

use async_trait::async_trait;

use crate::config::AzureConfig;
use crate::{Error, Result};

/// Synthesizes speech from text
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize text to WAV bytes (16kHz 16-bit mono PCM)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Azure speech synthesis client
pub struct AzureTts {
    client: reqwest::Client,
    key: String,
    voice: String,
    language: String,
    url: String,
}

impl AzureTts {
    /// Create a new TTS client from the Azure config
    ///
    /// # Errors
    ///
    /// Returns error if the subscription key is missing
    pub fn new(config: &AzureConfig) -> Result<Self> {
        if config.key.is_empty() {
            return Err(Error::Config(
                "Azure subscription key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            key: config.key.clone(),
            voice: config.voice.clone(),
            language: config.language.clone(),
            url: format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                config.region
            ),
        })
    }

    /// Override the endpoint URL (tests)
    #[must_use]
    pub fn with_endpoint(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    /// Synthesize text straight into a file
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or the write fails
    pub async fn synthesize_to_file(&self, text: &str, path: &Path) -> Result<()> {
        let audio = self.synthesize(text).await?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, audio)?;
        tracing::debug!(path = %path.display(), "synthesized audio written");
        Ok(())
    }

    fn ssml(&self, text: &str) -> String {
        format!(
            "<speak version='1.0' xml:lang='{lang}'><voice name='{voice}'>{text}</voice></speak>",
            lang = self.language,
            voice = self.voice,
            text = escape_xml(text),
        )
    }
}

#[async_trait]
impl Synthesizer for AzureTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(chars = text.chars().count(), "starting synthesis");

        let response = self
            .client
            .post(&self.url)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", "riff-16khz-16bit-mono-pcm")
            .body(self.ssml(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("Azure TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(audio_bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }
}

/// Escape SSML-reserved characters in spoken text
fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
