//! LLM provider abstraction
//!
//! Provides a common streaming-completion interface over the upstream
//! chat-completion backends.

mod error;
mod openai_compat;
mod registry;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai_compat::OpenAiCompatClient;
pub use registry::{ProviderConfig, ProviderKind, ProviderRegistry};
pub use types::{Role, Turn};

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// Incremental token deltas from an in-flight completion.
///
/// Terminates at provider end-of-stream; a transport failure mid-stream is
/// surfaced as a final `Err` item.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Common interface for streaming LLM providers
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Open a streaming chat completion over the given messages.
    ///
    /// Deltas must be yielded as they arrive from the provider, never
    /// buffered into a single completed response.
    async fn stream_chat(&self, messages: &[Turn]) -> Result<TokenStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM clients
pub struct LoggingClient {
    inner: Arc<dyn LlmClient>,
    model_id: String,
}

impl LoggingClient {
    pub fn new(inner: Arc<dyn LlmClient>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmClient for LoggingClient {
    async fn stream_chat(&self, messages: &[Turn]) -> Result<TokenStream, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.stream_chat(messages).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    model = %self.model_id,
                    open_ms = %duration.as_millis(),
                    turns = messages.len(),
                    "Chat stream opened"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    open_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    "Chat stream failed to open"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
