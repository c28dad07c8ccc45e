//! Cache Aside - demo server
//!
//! Serves the catalog store through the cache over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_aside::{create_router, spawn_cleanup_task, AppState, Config, Orchestrator};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the engine and backing store, restore the snapshot if any
/// 4. Start background TTL cleanup task
/// 5. Start HTTP server on configured port
/// 6. On SIGINT/SIGTERM, stop the cleanup task and save the snapshot
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_aside=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cache server");

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        "Configuration loaded: capacity={}B, eviction={}, invalidation={}, port={}, cleanup_interval={}s",
        config.capacity_bytes,
        config.eviction_policy,
        config.invalidation_policy.name(),
        config.server_port,
        config.cleanup_interval
    );

    let state = AppState::from_config(&config)
        .await
        .context("failed to initialize cache")?;
    info!("Cache initialized");

    if let Some(path) = &config.snapshot_path {
        if path.exists() {
            match state.orchestrator.load_from(path).await {
                Ok(restored) => info!("Restored {} entries from snapshot", restored),
                Err(err) => warn!("Ignoring unreadable snapshot {}: {}", path.display(), err),
            }
        }
    }

    let cleanup_handle = spawn_cleanup_task(state.orchestrator.clone(), config.cleanup_interval);
    info!("Background cleanup task started");

    let orchestrator = state.orchestrator.clone();
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            cleanup_handle,
            orchestrator,
            config.snapshot_path.clone(),
        ))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the cleanup task and writes the snapshot.
async fn shutdown_signal(
    cleanup_handle: tokio::task::JoinHandle<()>,
    orchestrator: Arc<Orchestrator>,
    snapshot_path: Option<PathBuf>,
) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cleanup_handle.abort();
    warn!("Cleanup task aborted");

    if let Some(path) = snapshot_path {
        if let Err(err) = orchestrator.save_to(&path).await {
            error!("Failed to save snapshot to {}: {}", path.display(), err);
        }
    }
}
