//! fortuned - streaming fortune-telling gateway
//!
//! Serves LLM-generated daily readings over SSE, answering repeat requests
//! from a persisted cache and carrying capped follow-up conversations.

mod api;
mod config;
mod db;
mod gateway;
mod llm;
mod prompt;
mod sse;

use api::{create_router, AppState};
use config::Config;
use db::Database;
use llm::{ProviderConfig, ProviderRegistry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fortuned=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = Config::from_env();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    // Initialize provider registry
    let registry = Arc::new(ProviderRegistry::new(&ProviderConfig::from_env()));
    if registry.has_providers() {
        tracing::info!(providers = ?registry.available(), "Provider registry initialized");
    } else {
        tracing::warn!("No LLM API keys configured. Set DEEPSEEK_API_KEY or OPENAI_API_KEY.");
    }

    // Create application state
    let state = AppState::new(db, registry, config.pacing);

    // Create router. No compression layer: SSE responses must reach the
    // client unbuffered.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("fortuned listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
