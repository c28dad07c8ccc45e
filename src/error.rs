//! Error types for the cache service
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine, orchestrator and HTTP surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing store has no record with this id
    #[error("Item not found: {0}")]
    NotFound(String),

    /// A single item does not fit the byte budget even against an empty cache
    #[error("Item of {size} bytes exceeds cache capacity of {capacity} bytes")]
    ItemTooLarge { size: u64, capacity: u64 },

    /// Unknown policy name or an incomplete policy; refused at construction
    #[error("Invalid policy configuration: {0}")]
    InvalidPolicyConfiguration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The backing store rejected or failed a read or write
    #[error("Backing store error: {0}")]
    Backing(String),

    /// A bulk fill is already running
    #[error("Bulk fill already running")]
    FillInProgress,

    /// Snapshot could not be written or read back
    #[error("Snapshot error: {0}")]
    Persistence(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Persistence(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::ItemTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::InvalidPolicyConfiguration(_) | CacheError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::Backing(_) => StatusCode::BAD_GATEWAY,
            CacheError::FillInProgress => StatusCode::CONFLICT,
            CacheError::Persistence(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache service.
pub type Result<T> = std::result::Result<T, CacheError>;
