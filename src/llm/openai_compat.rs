//! Streaming client for OpenAI-compatible chat-completion APIs
//!
//! Both supported backends (DeepSeek, OpenAI) speak the same
//! `POST /chat/completions` wire format with `stream: true`, so a single
//! implementation covers them; only base URL, key, and model differ.

use super::types::Turn;
use super::{LlmClient, LlmError, TokenStream};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// OpenAI-compatible streaming chat client
pub struct OpenAiCompatClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    model_id: String,
}

impl OpenAiCompatClient {
    pub fn new(api_key: String, base_url: &str, model: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            model_id: model.to_string(),
        }
    }

    fn classify_error(&self, status: reqwest::StatusCode, body: &str) -> LlmError {
        let message = body.to_string();
        match status.as_u16() {
            401 | 403 => LlmError::auth(format!("Authentication failed: {}", message)),
            429 => LlmError::rate_limit(format!("Rate limited: {}", message)),
            400 => LlmError::invalid_request(format!("Invalid request: {}", message)),
            500..=599 => LlmError::server_error(format!("Server error: {}", message)),
            _ => LlmError::unknown(format!("HTTP {}: {}", status, message)),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn stream_chat(&self, messages: &[Turn]) -> Result<TokenStream, LlmError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {}", e))
                } else {
                    LlmError::unknown(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.classify_error(status, &body));
        }

        // Decode the provider's SSE byte stream on a dedicated task. Lines
        // may be split across network chunks, so a carry-over buffer is
        // required; dropping the receiver cancels the upstream read.
        let mut byte_stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel::<Result<String, LlmError>>(32);

        tokio::spawn(async move {
            let mut buffer = String::new();
            while let Some(next) = byte_stream.next().await {
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(LlmError::network(format!("Stream read failed: {}", e))))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    match decode_stream_line(line.trim_end()) {
                        StreamLine::Token(token) => {
                            if tx.send(Ok(token)).await.is_err() {
                                return;
                            }
                        }
                        StreamLine::Done => return,
                        StreamLine::Skip => {}
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

enum StreamLine {
    Token(String),
    Done,
    Skip,
}

/// Decode one SSE line from the chat-completion stream.
///
/// Malformed payload lines are skipped (and logged), never fatal.
fn decode_stream_line(line: &str) -> StreamLine {
    let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
        return StreamLine::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return StreamLine::Done;
    }

    match serde_json::from_str::<ChunkPayload>(data) {
        Ok(payload) => {
            let content = payload
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .unwrap_or_default();
            if content.is_empty() {
                StreamLine::Skip
            } else {
                StreamLine::Token(content)
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable stream line");
            StreamLine::Skip
        }
    }
}

// OpenAI-compatible API types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Turn>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}
