//! Upstream generation client — the single point of entry for streaming LLM
//! calls.
//!
//! The trait is the seam the gateway depends on; tests substitute a scripted
//! implementation. The production client speaks the OpenAI-compatible chat
//! completions protocol with `stream: true` and relays parsed tokens over a
//! channel from a reader task.

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::Config;
use crate::streaming::parser::parse_chunk;

/// Fixed system instruction sent with every generation.
const SYSTEM_INSTRUCTION: &str =
    "You are a professional AI interviewer. Engage in depth with the candidate's answers.";

/// Buffered tokens between the reader task and the relay loop.
const TOKEN_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// A source of streamed generations. `open` resolves once the upstream has
/// accepted the request; tokens then arrive on the returned channel in emission
/// order. The channel closing without an error is natural completion.
#[async_trait]
pub trait CompletionStream: Send + Sync {
    async fn open(
        &self,
        prompt: &str,
    ) -> Result<mpsc::Receiver<Result<String, UpstreamError>>, UpstreamError>;
}

/// Production client for an OpenAI-compatible chat completions endpoint.
pub struct OpenAiStreamClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiStreamClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.openai_api_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            max_tokens: config.openai_max_tokens,
            temperature: config.openai_temperature,
        }
    }
}

#[async_trait]
impl CompletionStream for OpenAiStreamClient {
    async fn open(
        &self,
        prompt: &str,
    ) -> Result<mpsc::Receiver<Result<String, UpstreamError>>, UpstreamError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_INSTRUCTION},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": true,
        });

        debug!(model = %self.model, "Sending streaming request");

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(UpstreamError::Network(e.to_string()))).await;
                        return;
                    }
                };

                for token in parse_chunk(&String::from_utf8_lossy(&bytes)) {
                    if tx.send(Ok(token)).await.is_err() {
                        // Receiver dropped: the stream was cancelled.
                        return;
                    }
                }
            }
            // tx drops here; a closed channel signals natural completion.
        });

        Ok(rx)
    }
}
