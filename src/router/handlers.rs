use std::collections::HashMap;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::errors::IndexerError;
use crate::indexer::lib::IndexerHandle;
use crate::indexer::status::ChainStatus;

/// Internal error wrapper for HTTP handlers.
#[doc(hidden)]
pub struct Error(IndexerError);

impl From<IndexerError> for Error {
    fn from(e: IndexerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

pub async fn health(State(handle): State<IndexerHandle>) -> Result<&'static str, Error> {
    handle.check_store().await.map_err(|e| {
        warn!("[router] Health check failed: {}", e);
        Error::from(e)
    })?;
    Ok("Healthy")
}

pub async fn status(State(handle): State<IndexerHandle>) -> Json<HashMap<String, ChainStatus>> {
    Json(handle.get_status())
}
