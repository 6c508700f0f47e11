//! # Health Router
//!
//! A small axum server for load balancer checks and operator diagnostics.
//!
//! ## Endpoints
//!
//! - `GET /` - 200 "Healthy" when the store answers, 500 otherwise
//! - `GET /status` - per-chain checkpoint, connectivity and loop state as JSON
//!
//! The server stops accepting connections when the indexer's cancellation
//! token fires.

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::{IndexerError, Result};
use crate::indexer::lib::IndexerHandle;

mod handlers;

pub fn build_router(handle: IndexerHandle) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/status", get(handlers::status))
        .with_state(handle)
}

/// Binds `endpoint` and serves until `cancel` fires.
pub async fn initialize_router(
    endpoint: &str,
    handle: IndexerHandle,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(endpoint).await.map_err(|e| {
        IndexerError::configuration("router_endpoint", format!("Failed to bind {endpoint}: {e}"))
    })?;
    serve(listener, handle, cancel).await
}

pub async fn serve(
    listener: TcpListener,
    handle: IndexerHandle,
    cancel: CancellationToken,
) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .map_err(|e| IndexerError::internal(format!("Failed to get local address: {e}")))?;
    info!("[router] Listening on {}", local_addr);

    axum::serve(listener, build_router(handle).into_make_service())
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("[router] Shutdown signal received");
        })
        .await
        .map_err(|e| IndexerError::internal(format!("Router failed: {e}")))
}
