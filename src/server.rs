//! # HTTP Server
//!
//! Health check and Prometheus metrics endpoints:
//! - `/healthz` - liveness probe (always returns 200)
//! - `/metrics` - Prometheus metrics in text format

use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::observability::metrics::REGISTRY;

/// Bind the listener; failing here fails controller startup
pub async fn bind(bind_address: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("binding http server to {bind_address}"))?;
    info!("http server listening on {bind_address}");
    Ok(listener)
}

/// Serve health and metrics until the process exits
pub async fn serve(listener: TcpListener) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler));

    axum::serve(listener, app).await?;

    Ok(())
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("failed to encode metrics: {}", e).into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}
