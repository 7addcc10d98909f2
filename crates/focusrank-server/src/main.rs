//! # focusrank-server
//!
//! Backend for the focusrank productivity app.
//!
//! This binary provides:
//! - **Usage ingestion** of per-app minutes or pre-aggregated days, bucketed
//!   through a cached app classifier
//! - **Efficiency scores and streaks** computed on demand from stored days
//! - **Squad leaderboards** re-ranked on every write and pushed to
//!   WebSocket subscribers
//! - **Squad chat** with moderation, per-user rate limiting and realtime
//!   fan-out

mod aggregator;
mod api;
mod chat;
mod classifier;
mod config;
mod db;
mod error;
mod leaderboard;
mod realtime;
mod resolver;

use std::time::Duration;

use focusrank_store::Database;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;

/// How often idle chat state is swept, and how long a bucket may sit unused.
const PURGE_INTERVAL: Duration = Duration::from_secs(300);
const MAX_BUCKET_IDLE: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,focusrank_server=debug")),
        )
        .init();

    info!("Starting focusrank server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(
        classifier = config.classifier_url.as_deref().unwrap_or("keyword rules"),
        chat_rate = config.chat_rate_per_sec,
        chat_burst = config.chat_burst,
        "Service settings"
    );

    // -----------------------------------------------------------------------
    // 3. Open the database and wire services
    // -----------------------------------------------------------------------
    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    if let Some(path) = database.path() {
        info!(path = %path.display(), "Database ready");
    }

    let http_addr = config.http_addr;
    let app_state = AppState::new(config, db::shared(database));

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic sweep of idle rate buckets and unused realtime channels
    let chat = app_state.chat.clone();
    let leaderboards = app_state.leaderboards.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let buckets = chat.purge_idle(MAX_BUCKET_IDLE);
            let channels = leaderboards.prune_idle_channels();
            debug!(buckets, channels, "Idle sweep finished");
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
