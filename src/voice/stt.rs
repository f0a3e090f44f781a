//! Speech-to-text via the Azure conversation endpoint

use std::time::Duration;

use async_trait::async_trait;

use crate::config::AzureConfig;
use crate::{Error, Result};

/// Request timeout per attempt
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

/// Attempts before giving up
const MAX_RETRIES: u32 = 2;

/// Response from the Azure STT API
#[derive(serde::Deserialize)]
struct AzureSttResponse {
    #[serde(rename = "DisplayText", default)]
    display_text: String,
}

/// Transcribes recorded audio to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV audio to text
    ///
    /// # Errors
    ///
    /// Returns error if all attempts fail
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Azure speech recognition client
pub struct AzureStt {
    client: reqwest::Client,
    key: String,
    url: String,
}

impl AzureStt {
    /// Create a new STT client from the Azure config
    ///
    /// # Errors
    ///
    /// Returns error if the subscription key is missing
    pub fn new(config: &AzureConfig) -> Result<Self> {
        if config.key.is_empty() {
            return Err(Error::Config(
                "Azure subscription key required for STT".to_string(),
            ));
        }

        let url = format!(
            "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1?language={}",
            config.region, config.language
        );

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
            key: config.key.clone(),
            url,
        })
    }

    /// Override the endpoint URL (tests)
    #[must_use]
    pub fn with_endpoint(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    async fn attempt(&self, audio: Vec<u8>) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .header("Accept", "application/json;text/xml")
            .header(
                "Content-Type",
                "audio/wav; codecs=audio/pcm; samplerate=16000",
            )
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .body(audio)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Azure STT error {status}: {body}")));
        }

        let result: AzureSttResponse = response.json().await?;
        Ok(result.display_text)
    }
}

#[async_trait]
impl Transcriber for AzureStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match self.attempt(audio.to_vec()).await {
                Ok(text) => {
                    tracing::info!(transcript = %text, "transcription complete");
                    return Ok(text);
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "STT request failed");
                    last_err = Some(e);
                    if attempt + 1 < MAX_RETRIES {
                        let wait = Duration::from_secs(3 * u64::from(attempt + 1));
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Stt("no attempts made".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header_exists, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client(url: String) -> AzureStt {
        AzureStt::new(&AzureConfig {
            key: "test-key".to_string(),
            region: "eastasia".to_string(),
            language: "zh-CN".to_string(),
            voice: "zh-CN-XiaoxiaoNeural".to_string(),
        })
        .unwrap()
        .with_endpoint(url)
    }

    #[tokio::test]
    async fn transcribe_extracts_display_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("Ocp-Apim-Subscription-Key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "RecognitionStatus": "Success",
                "DisplayText": "现在几点了",
            })))
            .mount(&server)
            .await;

        let stt = test_client(server.uri());
        let text = stt.transcribe(b"fake wav").await.unwrap();
        assert_eq!(text, "现在几点了");
    }

    #[tokio::test]
    async fn transcribe_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"DisplayText": "你好"})),
            )
            .mount(&server)
            .await;

        let stt = test_client(server.uri());
        let text = stt.transcribe(b"fake wav").await.unwrap();
        assert_eq!(text, "你好");
    }

    #[tokio::test]
    async fn transcribe_fails_after_all_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let stt = test_client(server.uri());
        assert!(stt.transcribe(b"fake wav").await.is_err());
    }

    #[test]
    fn missing_key_is_rejected() {
        let result = AzureStt::new(&AzureConfig {
            key: String::new(),
            region: "eastasia".to_string(),
            language: "zh-CN".to_string(),
            voice: "x".to_string(),
        });
        assert!(result.is_err());
    }
}
