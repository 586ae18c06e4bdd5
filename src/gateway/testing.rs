//! Shared test doubles for gateway tests

use super::{Gateway, StreamEvent};
use crate::config::Pacing;
use crate::db::{Database, Gender, UserProfile};
use crate::llm::{LlmClient, LlmError, ProviderKind, ProviderRegistry, TokenStream, Turn};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Stub provider that replays a fixed delta script and records every call.
#[derive(Clone)]
pub(crate) struct ScriptedClient {
    deltas: Vec<String>,
    fail_after_script: bool,
    calls: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<Vec<Turn>>>>,
}

impl ScriptedClient {
    pub(crate) fn new(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            fail_after_script: false,
            calls: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Yield the scripted deltas, then fail the stream.
    pub(crate) fn failing_after(deltas: &[&str]) -> Self {
        Self {
            fail_after_script: true,
            ..Self::new(deltas)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sent_messages(&self) -> Vec<Vec<Turn>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn stream_chat(&self, messages: &[Turn]) -> Result<TokenStream, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(messages.to_vec());

        let mut items: Vec<Result<String, LlmError>> =
            self.deltas.iter().cloned().map(Ok).collect();
        if self.fail_after_script {
            items.push(Err(LlmError::server_error("scripted failure")));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

/// Gateway over an in-memory store with the stub registered as DeepSeek and
/// all pacing delays removed.
pub(crate) fn scripted_gateway(db: &Database, client: ScriptedClient) -> Gateway {
    let registry =
        ProviderRegistry::new_empty().with_client(ProviderKind::DeepSeek, Arc::new(client));
    Gateway::new(db.clone(), Arc::new(registry), Pacing::instant())
}

pub(crate) fn test_profile() -> UserProfile {
    UserProfile {
        uid: "u1".to_string(),
        username: "小明".to_string(),
        gender: Gender::Male,
        birth_date: "1995-08-12".to_string(),
        birth_time: "07:30".to_string(),
        created_at: Utc::now(),
    }
}

pub(crate) async fn collect_events(mut stream: ReceiverStream<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}
