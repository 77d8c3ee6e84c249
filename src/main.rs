//! Filecache server - serves a persistent LRU/TTL file cache over HTTP
//!
//! Values are stored one file per key under `CACHE_DIR` and survive restarts.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use filecache::api::create_router;
use filecache::{spawn_sync_task, AppState, Config, Mapping};

/// Main entry point for the filecache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the cache directory with the configured flag
/// 4. Start the background sweep and sync task
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. On SIGINT/SIGTERM stop the task and close the cache
#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filecache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting filecache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: dir={}, flag={}, max_entries={}, default_ttl={}s, port={}, sync_interval={}s",
        config.cache_dir.display(),
        config.cache_flag,
        config.max_entries,
        config.default_ttl,
        config.server_port,
        config.sync_interval
    );

    let state = AppState::from_config(&config)
        .with_context(|| format!("failed to open cache at {}", config.cache_dir.display()))?;

    let sync_handle = spawn_sync_task(state.cache.clone(), config.sync_interval);
    info!("Background sweep and sync task started");

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sync_handle))
        .await
        .context("server error")?;

    // Persist the write buffer and expiry index before exiting
    state
        .cache
        .write()
        .await
        .shelf
        .close()
        .context("failed to close cache")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the sync task and allows graceful shutdown.
async fn shutdown_signal(sync_handle: JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
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
                warn!(error = %err, "Failed to install SIGTERM handler");
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

    sync_handle.abort();
    warn!("Sync task aborted");
}
