//! Error taxonomy.
//!
//! Probes swallow everything into a `Verdict`; the Batch Runner surfaces
//! only cancellation; the API layer maps `ApiError` to HTTP status codes;
//! fatal errors (cannot open the store file, cannot bind the API port)
//! abort the process via `anyhow`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the durable store (§4.1). Score/attribute writes are
/// hard errors and are surfaced to the caller; lease-status writes are
/// best-effort and only logged (see `storage::proxy_store`).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors surfaced by the API layer (§4.7, §7).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no idle proxy matched the requested filters")]
    LeaseExhausted,
    #[error("lease task_id mismatch")]
    LeaseMismatch,
    #[error("unknown endpoint: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    code: u16,
    message: String,
    data: Option<T>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::LeaseExhausted => StatusCode::NOT_FOUND,
            ApiError::LeaseMismatch => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Envelope::<()> {
            code: status.as_u16(),
            message: self.to_string(),
            data: None,
        };
        (status, axum::Json(body)).into_response()
    }
}
