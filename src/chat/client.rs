//! Chat completion client (streaming and batch)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::chat::history::ChatHistory;
use crate::config::ChatConfig;
use crate::voice::SpeechPipeline;
use crate::{Error, Result};

/// Fallback reply when the backend yields nothing usable
const FALLBACK_REPLY: &str = "抱歉，我无法获取回复。请稍后重试。";

/// Request timeout, connection through the end of the body; no retry
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Conversational backend behind one voice turn
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one user utterance and return the full reply text
    ///
    /// In streaming mode this also drives the speech pipeline and does not
    /// return until everything has been spoken.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails before any reply arrives
    async fn send(&self, text: &str) -> Result<String>;

    /// Abort an in-flight reply; the stream stops at the next chunk boundary
    fn cancel_stream(&self);

    /// Whether streamed speech for the last reply has finished
    fn synthesis_complete(&self) -> bool;

    /// Persist the conversation history
    ///
    /// # Errors
    ///
    /// Returns error if the history cannot be written
    fn save(&self) -> Result<()>;
}

/// OpenAI-compatible chat completions client
pub struct ChatClient {
    client: reqwest::Client,
    config: ChatConfig,
    url: String,
    timeout: Duration,
    history: Mutex<ChatHistory>,
    pipeline: Option<Arc<SpeechPipeline>>,
    tokens_tx: broadcast::Sender<String>,
    cancelled: AtomicBool,
}

impl ChatClient {
    /// Create a client over the given history
    ///
    /// `pipeline` enables streamed speech; without it replies come back as
    /// plain text for the caller to synthesize.
    #[must_use]
    pub fn new(
        config: ChatConfig,
        history: ChatHistory,
        pipeline: Option<Arc<SpeechPipeline>>,
        tokens_tx: broadcast::Sender<String>,
    ) -> Self {
        let url = config.api_url.clone();
        Self {
            client: reqwest::Client::new(),
            config,
            url,
            timeout: REQUEST_TIMEOUT,
            history: Mutex::new(history),
            pipeline,
            tokens_tx,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Override the endpoint URL (tests)
    #[must_use]
    pub fn with_endpoint(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    /// Override the request timeout (tests)
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_body(&self, stream: bool) -> serde_json::Value {
        let history = self.history.lock().expect("history lock");
        serde_json::json!({
            "model": self.config.model,
            "messages": history.messages(),
            "stream": stream,
            "max_tokens": self.config.max_tokens,
            "temperature": 0.7,
            "top_p": 0.7,
        })
    }

    async fn send_streaming(&self) -> Result<(String, Option<u32>)> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(true))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("chat backend error {status}: {body}")));
        }

        let mut reply = String::new();
        let mut total_tokens = None;
        let mut line_buffer = String::new();
        let mut stream = response.bytes_stream();

        'stream: while let Some(chunk) = stream.next().await {
            if self.cancelled.load(Ordering::SeqCst) {
                tracing::info!("chat stream cancelled");
                break;
            }
            let chunk = chunk?;
            line_buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = line_buffer.find('\n') {
                let line = line_buffer.drain(..=newline).collect::<String>();
                let line = line.trim();
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    break 'stream;
                }

                let parsed: StreamChunk = match serde_json::from_str(data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::warn!(error = %e, "unparseable stream chunk, skipping");
                        continue;
                    }
                };
                if let Some(usage) = parsed.usage {
                    total_tokens = Some(usage.total_tokens);
                }
                let Some(delta) = parsed
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.as_deref())
                else {
                    continue;
                };
                if delta.is_empty() {
                    continue;
                }

                reply.push_str(delta);
                let _ = self.tokens_tx.send(delta.to_string());
                if let Some(pipeline) = &self.pipeline {
                    pipeline.feed(delta).await;
                }
            }
        }

        Ok((reply, total_tokens))
    }

    async fn send_batch(&self) -> Result<(String, Option<u32>)> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(false))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("chat backend error {status}: {body}")));
        }

        let completion: Completion = response.json().await?;
        let reply = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok((reply, completion.usage.map(|u| u.total_tokens)))
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn send(&self, text: &str) -> Result<String> {
        self.cancelled.store(false, Ordering::SeqCst);
        {
            let mut history = self.history.lock().expect("history lock");
            history.push_user(text);
        }

        let result = if self.config.streaming {
            self.send_streaming().await
        } else {
            self.send_batch().await
        };

        let (mut reply, total_tokens) = match result {
            Ok(ok) => ok,
            Err(e) => {
                // Flush the pipeline so it goes idle even on failure
                if let Some(pipeline) = &self.pipeline {
                    pipeline.end().await;
                }
                return Err(e);
            }
        };

        let cancelled = self.cancelled.load(Ordering::SeqCst);
        if reply.is_empty() && !cancelled {
            tracing::warn!("chat backend returned an empty reply");
            reply = FALLBACK_REPLY.to_string();
            let _ = self.tokens_tx.send(reply.clone());
            if let Some(pipeline) = &self.pipeline {
                pipeline.feed(&reply).await;
            }
        }

        {
            let mut history = self.history.lock().expect("history lock");
            history.push_assistant(&reply);
            if let Some(tokens) = total_tokens {
                history.trim(tokens);
            }
        }

        if let Some(pipeline) = &self.pipeline {
            pipeline.end().await;
            if !cancelled {
                pipeline.wait_idle().await;
            }
        }
        Ok(reply)
    }

    fn cancel_stream(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(pipeline) = &self.pipeline {
            pipeline.stop();
        }
    }

    fn synthesis_complete(&self) -> bool {
        self.pipeline.as_ref().is_none_or(|p| p.is_idle())
    }

    fn save(&self) -> Result<()> {
        self.history.lock().expect("history lock").save()
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<BatchChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct BatchChoice {
    message: BatchMessage,
}

#[derive(Deserialize)]
struct BatchMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client(url: String, streaming: bool) -> ChatClient {
        let dir = std::env::temp_dir().join("hearth-chat-test");
        let config = ChatConfig {
            api_url: url.clone(),
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            streaming,
            max_tokens: 256,
            token_threshold: 1200,
            system_prompt: "prompt".to_string(),
        };
        let history = ChatHistory::new("prompt", 1200, dir.join("message.data"));
        let (tokens_tx, _) = broadcast::channel(16);
        ChatClient::new(config, history, None, tokens_tx).with_endpoint(url)
    }

    fn sse_body(lines: &[&str]) -> String {
        let mut body = String::new();
        for line in lines {
            body.push_str("data: ");
            body.push_str(line);
            body.push_str("\n\n");
        }
        body
    }

    #[tokio::test]
    async fn streaming_reply_is_accumulated_from_deltas() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            r#"{"choices":[{"delta":{"content":"你好"}}]}"#,
            r#"{"choices":[{"delta":{"content":"，我是蛋卷。"}}],"usage":{"total_tokens":42}}"#,
            "[DONE]",
        ]);
        Mock::given(method("POST"))
            .and(body_string_contains("\"stream\":true"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = test_client(server.uri(), true);
        let reply = client.send("你是谁").await.unwrap();
        assert_eq!(reply, "你好，我是蛋卷。");
    }

    #[tokio::test]
    async fn streaming_tokens_fan_out_to_subscribers() {
        let server = MockServer::start().await;
        let body = sse_body(&[r#"{"choices":[{"delta":{"content":"片段"}}]}"#, "[DONE]"]);
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = test_client(server.uri(), true);
        let mut rx = client.tokens_tx.subscribe();
        client.send("hi").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "片段");
    }

    #[tokio::test]
    async fn batch_reply_is_extracted_from_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"stream\":false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "现在是下午三点。"}}],
                "usage": {"total_tokens": 30},
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri(), false);
        let reply = client.send("现在几点").await.unwrap();
        assert_eq!(reply, "现在是下午三点。");
    }

    #[tokio::test]
    async fn empty_reply_falls_back_to_apology() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [],
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri(), false);
        let reply = client.send("hi").await.unwrap();
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn stalled_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(sse_body(&["[DONE]"]))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let client = test_client(server.uri(), true).with_timeout(Duration::from_millis(200));
        assert!(client.send("hi").await.is_err());
    }

    #[tokio::test]
    async fn backend_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(server.uri(), true);
        assert!(client.send("hi").await.is_err());
    }
}
