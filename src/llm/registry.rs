//! Provider registry
//!
//! Providers are a closed set, selected by `ProviderKind`; the registry is
//! built once at startup from the environment and never mutated afterwards.

#![allow(dead_code)] // new_empty()/with_client() used in tests

use super::{LlmClient, LoggingClient, OpenAiCompatClient};
use std::collections::HashMap;
use std::sync::Arc;

const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
const DEEPSEEK_MODEL: &str = "deepseek-chat";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4o-mini";

/// Upstream backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    DeepSeek,
    OpenAi,
}

impl ProviderKind {
    /// Parse the `provider` request parameter (case-insensitive).
    pub fn from_param(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "deepseek" => Some(Self::DeepSeek),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek",
            Self::OpenAi => "openai",
        }
    }
}

/// Configuration for LLM providers
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub deepseek_api_key: Option<String>,
    pub deepseek_base_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self {
            deepseek_api_key: std::env::var("DEEPSEEK_API_KEY").ok(),
            deepseek_base_url: std::env::var("DEEPSEEK_BASE_URL").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
        }
    }
}

/// Registry of available providers
pub struct ProviderRegistry {
    clients: HashMap<ProviderKind, Arc<dyn LlmClient>>,
}

impl ProviderRegistry {
    pub fn new(config: &ProviderConfig) -> Self {
        let mut clients: HashMap<ProviderKind, Arc<dyn LlmClient>> = HashMap::new();

        if let Some(key) = config.deepseek_api_key.clone() {
            let base_url = config.deepseek_base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
            let client = OpenAiCompatClient::new(key, base_url, DEEPSEEK_MODEL);
            clients.insert(
                ProviderKind::DeepSeek,
                Arc::new(LoggingClient::new(Arc::new(client))),
            );
        }

        if let Some(key) = config.openai_api_key.clone() {
            let base_url = config.openai_base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
            let client = OpenAiCompatClient::new(key, base_url, OPENAI_MODEL);
            clients.insert(
                ProviderKind::OpenAi,
                Arc::new(LoggingClient::new(Arc::new(client))),
            );
        }

        Self { clients }
    }

    /// Create an empty registry for testing purposes
    pub fn new_empty() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Register a client directly (test seam for stub providers)
    pub fn with_client(mut self, kind: ProviderKind, client: Arc<dyn LlmClient>) -> Self {
        self.clients.insert(kind, client);
        self
    }

    /// Get a provider by kind
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn LlmClient>> {
        self.clients.get(&kind).cloned()
    }

    /// List all available provider names
    pub fn available(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.clients.keys().map(ProviderKind::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check if any providers are available
    pub fn has_providers(&self) -> bool {
        !self.clients.is_empty()
    }
}
