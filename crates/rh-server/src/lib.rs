//! rh-server: library scanning, transcoding and the HTTP API.
//!
//! This crate ties the other rh-* crates together into a running server:
//!
//! - [`scanner::LibraryScanner`] keeps the library in sync with disk
//! - [`transcoder::TranscodingManager`] runs deduplicated, cached encodes
//!   and HLS packaging
//! - [`rate_limit::RateLimiter`] gates manual scans and progress updates
//! - an Axum HTTP API over all of the above
//! - periodic rescans and cache sweeps, with graceful shutdown

pub mod context;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod router;
pub mod routes;
pub mod scanner;
pub mod tasks;
pub mod transcoder;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rh_av::{Encoder, FfmpegEncoder, ToolRegistry};
use rh_core::config::Config;
use rh_db::{MediaStore, SqliteStore};
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Open the configured metadata store, creating its directory if needed.
/// Returns `None` when no database path is configured.
pub fn open_store(config: &Config) -> rh_core::Result<Option<Arc<dyn MediaStore>>> {
    let Some(db_path) = &config.server.db_path else {
        tracing::info!("No database configured; running from the in-memory snapshot");
        return Ok(None);
    };
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let existed = db_path.exists();
    let db_str = db_path.to_string_lossy();
    let store = SqliteStore::open(&db_str, config.library.read_only)?;
    if existed {
        tracing::info!(read_only = config.library.read_only, "Database opened (existing) at {db_str}");
    } else {
        tracing::info!("Database created (new) at {db_str}");
    }
    Ok(Some(Arc::new(store)))
}

/// Build the encoder from discovered tools, falling back to `ffmpeg` on
/// `PATH` so the server still starts without it.
pub fn build_encoder(tools: &ToolRegistry, config: &Config) -> Arc<dyn Encoder> {
    let timeout = config.transcoding.encode_timeout();
    match FfmpegEncoder::from_registry(tools, timeout) {
        Ok(encoder) => Arc::new(encoder),
        Err(e) => {
            tracing::warn!(error = %e, "ffmpeg not found; transcodes will fail until it is installed");
            Arc::new(FfmpegEncoder::new("ffmpeg".into(), timeout))
        }
    }
}

/// Start the reelhouse server.
///
/// Opens the store, builds the [`AppContext`], spawns background tasks and
/// serves HTTP until a shutdown signal is received.
pub async fn start(config: Config) -> rh_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let store = open_store(&config)?;

    let tools = ToolRegistry::discover(&config.tools);
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }
    let encoder = build_encoder(&tools, &config);

    std::fs::create_dir_all(&config.transcoding.cache_dir)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| rh_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(config, store, encoder, tools);
    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    let scan_secs = ctx.config.library.scan_interval_secs;
    if scan_secs > 0 && !ctx.scanner.roots().is_empty() {
        handles.push(tokio::spawn(tasks::run_periodic_scan(
            ctx.clone(),
            Duration::from_secs(scan_secs),
            cancel.clone(),
        )));
    }
    let sweep_secs = ctx.config.transcoding.cleanup_interval_secs.max(1);
    handles.push(tokio::spawn(tasks::run_cache_sweep(
        ctx.clone(),
        Duration::from_secs(sweep_secs),
        cancel.clone(),
    )));

    let app = router::build_router(ctx);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| rh_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }

    served.map_err(|e| rh_core::Error::Internal(format!("Server error: {e}")))?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or for `cancel`.
pub async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_is_optional() {
        let mut config = Config::default();
        config.server.db_path = None;
        assert!(open_store(&config).unwrap().is_none());
    }

    #[test]
    fn store_directory_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.db_path = Some(tmp.path().join("nested/dir/reelhouse.db"));
        let store = open_store(&config).unwrap().unwrap();
        assert!(!store.read_only());
        assert!(tmp.path().join("nested/dir").is_dir());
    }
}
