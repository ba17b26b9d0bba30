//! # uproxy upload gateway
//!
//! Accepts single-file multipart uploads, checks them against the configured
//! extension allow-list and size ceiling, stores them in a Google Cloud
//! Storage bucket under an unguessable name and returns the public URL.
//!
//! ## API endpoints
//! - `POST /upload` — store one file, respond with its public URL
//! - `GET /healthz` — liveness probe
//!
//! ## Environment
//! - `GCP_BUCKET` (required) — target bucket
//! - `GCP_CREDENTIALS_PATH` (required) — service-account key file
//! - `ALLOWED_FILES` — comma-separated extension allow-list
//! - `UPROXY_MAX_FILESIZE` — size ceiling in megabytes
//! - `UPROXY_HOST` / `UPROXY_PORT` — bind address (`0.0.0.0:8000`)
//! - `GCS_ENDPOINT` — Cloud Storage API base URL
//! - `RUST_LOG` — log filter (`info`)

mod config;
mod endpoints;
mod error;
mod storage;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use config::{AppState, Settings};

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env().context("invalid gateway configuration")?;

    let allowed = settings.allowed_extensions.as_ref().map(|set| {
        let mut list: Vec<&str> = set.iter().map(String::as_str).collect();
        list.sort_unstable();
        list.join(",")
    });
    tracing::info!(
        bucket = %settings.bucket,
        allowed_extensions = allowed.as_deref().unwrap_or("<any>"),
        max_file_size_bytes = ?settings.max_file_size_bytes,
        gcs_endpoint = %settings.gcs_endpoint,
        "gateway configured"
    );

    let addr = settings.bind_addr();
    let state = Arc::new(AppState::new(settings));
    let app = endpoints::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("uproxy listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}
