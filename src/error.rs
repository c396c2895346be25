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
/// Unified error type for the cache service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Logical key is empty or the composed key is too long
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// TTL cannot be applied (zero duration)
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Value could not be serialized
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Stored payload could not be decompressed or deserialized
    #[error("Decoding failed: {0}")]
    Decoding(String),

    /// Store unreachable, connection dropped, or operation timed out
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Store rejected the command (wrong type, script error, ...)
    #[error("Store error: {0}")]
    Store(String),

    /// Lock held by another owner
    #[error("Could not acquire lock: {0}")]
    LockAcquisition(String),

    /// Configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Warm-up loader failed before producing entries
    #[error("Loader failed: {0}")]
    Loader(String),
}

impl CacheError {
    /// Returns true for failures caused by the store being out of reach.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::StoreUnavailable(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            CacheError::StoreUnavailable(err.to_string())
        } else {
            CacheError::Store(err.to_string())
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidKey(_) | CacheError::InvalidTtl(_) => StatusCode::BAD_REQUEST,
            CacheError::LockAcquisition(_) => StatusCode::CONFLICT,
            CacheError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Encoding(_)
            | CacheError::Decoding(_)
            | CacheError::Store(_)
            | CacheError::Config(_)
            | CacheError::Loader(_) => StatusCode::INTERNAL_SERVER_ERROR,
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
