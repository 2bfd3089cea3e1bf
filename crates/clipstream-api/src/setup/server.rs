//! Server startup and graceful shutdown.

use anyhow::{Context, Result};
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use clipstream_core::Config;

/// Bind, serve, and on a shutdown signal drain both the HTTP connections and
/// the ingest scheduler before returning.
pub async fn start_server(
    config: &Config,
    app: Router,
    cancel: CancellationToken,
    scheduler: JoinHandle<()>,
) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        addr = %addr,
        videos_bucket = %config.buckets.videos,
        raw_videos_bucket = %config.buckets.raw_videos,
        workers = config.ingest.workers,
        "server ready and accepting connections"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    // The signal handler has already cancelled the scheduler token; wait for
    // the worker pool to drain.
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "ingest scheduler task failed");
    }

    tracing::info!("server and ingest scheduler stopped");
    Ok(())
}

/// Listens for SIGINT/SIGTERM, then cancels the scheduler token so HTTP and
/// ingest shut down together.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("received terminate signal");
        },
    }

    tracing::info!("shutting down gracefully");
    cancel.cancel();
}
