//! Liveness endpoint.

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serve `GET /statusz` until the cancellation token fires.
pub async fn run_statusz_server(port: u16, cancel: CancellationToken) -> Result<()> {
    let app = Router::new().route("/statusz", get(statusz));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("while binding liveness endpoint on port {port}"))?;
    info!(port, "liveness endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("while serving liveness endpoint")
}

async fn statusz() -> &'static str {
    "OK"
}
