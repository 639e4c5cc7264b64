//! Liveness endpoint for hosting platforms that probe an HTTP port.

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// Body of every liveness response
pub const HEALTH_BODY: &str = "Bot is running!";

async fn health() -> &'static str {
    HEALTH_BODY
}

/// Router answering any GET path with `200 Bot is running!`
pub fn router() -> Router {
    Router::new().fallback_service(get(health))
}

/// Serve the liveness endpoint on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops with an I/O error.
pub async fn serve_on(listener: TcpListener) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Liveness endpoint listening");
    }
    axum::serve(listener, router())
        .await
        .context("liveness endpoint stopped")
}

/// Bind `addr` and serve the liveness endpoint.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn serve(addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind liveness endpoint on {addr}"))?;
    serve_on(listener).await
}
