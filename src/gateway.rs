//! Streaming generation gateway
//!
//! The central state machine of the service: request fingerprints are
//! answered from the cache as a re-timed replay when possible, otherwise a
//! live provider stream is relayed and the finished result persisted; a
//! capped, append-only history drives follow-up turns.

mod continuation;
mod dispatcher;
#[cfg(test)]
mod proptests;
#[cfg(test)]
pub(crate) mod testing;

pub use continuation::ConversationView;

use crate::config::Pacing;
use crate::db::{Database, DbError};
use crate::llm::{LlmClient, LlmError, ProviderKind, ProviderRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// All stored turns count toward the cap, priming turns included.
pub const MAX_TURNS: usize = 30;

/// Fixed reply when a conversation has reached the cap. A soft limit, not an
/// error: delivered as ordinary content so clients need no special handling.
pub const TURN_CAP_REPLY: &str = "明天再来";

/// Number of leading priming turns produced by the current prompt template.
/// Recorded on each cache entry so the visible-history slice stays correct
/// if the template changes shape.
pub const PRIMING_TURNS: usize = 2;

/// Event stream produced by the dispatcher and continuation manager,
/// consumed by the SSE framer. `Done` is the last event on every path;
/// `Error` only ever appears immediately before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(String),
    Error(String),
    Done,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("conversation not found")]
    ConversationNotFound,
    #[error("provider not configured: {0}")]
    ProviderUnavailable(&'static str),
    #[error(transparent)]
    Provider(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] DbError),
}

/// Cloneable gateway handle; all state is injected, none is global.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    db: Database,
    registry: Arc<ProviderRegistry>,
    pacing: Pacing,
    // One async mutex per fingerprint serializes the miss window so two
    // identical concurrent requests yield a single upstream call. Entries
    // are kept for process lifetime, one per distinct fingerprint.
    generation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Gateway {
    pub fn new(db: Database, registry: Arc<ProviderRegistry>, pacing: Pacing) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                db,
                registry,
                pacing,
                generation_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    fn pacing(&self) -> Pacing {
        self.inner.pacing
    }

    fn client(&self, kind: ProviderKind) -> Result<Arc<dyn LlmClient>, GatewayError> {
        self.inner
            .registry
            .get(kind)
            .ok_or(GatewayError::ProviderUnavailable(kind.as_str()))
    }

    fn lock_for(&self, fingerprint: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.generation_locks.lock().unwrap();
        locks
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
