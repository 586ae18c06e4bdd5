//! HTTP API for the fortune gateway

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::config::Pacing;
use crate::db::Database;
use crate::gateway::Gateway;
use crate::llm::ProviderRegistry;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub db: Database,
    pub registry: Arc<ProviderRegistry>,
}

impl AppState {
    pub fn new(db: Database, registry: Arc<ProviderRegistry>, pacing: Pacing) -> Self {
        Self {
            gateway: Gateway::new(db.clone(), registry.clone(), pacing),
            db,
            registry,
        }
    }
}
