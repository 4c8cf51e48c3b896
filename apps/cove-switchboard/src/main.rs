mod cli;
mod config;
mod directory;
mod handlers;
mod lifecycle;
mod mailbox;
mod reaper;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    cli::Cli,
    config::Config,
    directory::{Directory, HttpDirectory, InMemoryDirectory},
    handlers::AppState,
    lifecycle::CallStore,
    mailbox::SignalMailbox,
    reaper::Reaper,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to WARN when RUST_LOG is not set.
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    tracing_subscriber::fmt::init();

    let mut config = Config::from_env();
    Cli::parse().apply(&mut config);
    info!("Starting cove switchboard on port {}", config.port);
    info!(
        "Ring timeout: {}s, sweep interval: {}s",
        config.ring_timeout_seconds, config.sweep_interval_seconds
    );

    let directory: Arc<dyn Directory> = match &config.directory_url {
        Some(url) => {
            info!("Directory backend: {}", url);
            Arc::new(HttpDirectory::new(url.clone()))
        }
        None => {
            info!("Directory backend: in-memory (local mode)");
            Arc::new(InMemoryDirectory::new())
        }
    };

    let calls = CallStore::new(config.ring_timeout_seconds as i64 * 1000);
    let mailbox = SignalMailbox::new();

    Reaper::new(
        calls.clone(),
        mailbox.clone(),
        Duration::from_secs(config.sweep_interval_seconds),
    )
    .spawn();

    let state = AppState {
        calls,
        mailbox,
        directory,
    };

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/calls", post(handlers::initiate_call))
        .route("/calls/:id", get(handlers::get_call_by_id))
        .route("/calls/:id/join", post(handlers::join_call))
        .route("/calls/:id/leave", post(handlers::leave_call))
        .route("/calls/:id/decline", post(handlers::decline_call))
        .route(
            "/calls/:id/signals",
            post(handlers::send_signal).get(handlers::get_signals),
        )
        .route("/signals/:id", delete(handlers::delete_signal))
        .route("/conversations/:id/call", get(handlers::get_active_call))
        .route("/users/:id/incoming-calls", get(handlers::get_incoming_calls))
        .route("/maintenance/sweep", post(handlers::run_sweep))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Cove switchboard listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
