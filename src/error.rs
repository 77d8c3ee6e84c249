//! Error types for the file cache
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cache::Key;

// == Cache Error Enum ==
/// Unified error type for the cache and its decorators.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Malformed flag string or invalid option
    #[error("Configuration error: {0}")]
    Config(String),

    /// The existence policy required a directory that is absent
    #[error("No such directory: '{}'", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Key absent, expired, or evicted
    #[error("Key not found: {0}")]
    KeyNotFound(Key),

    /// Direct access to the TTL index entry
    #[error("Reserved key: {0}")]
    ReservedKey(String),

    /// Mutation attempted on a read-only cache
    #[error("Unsupported operation: cache is opened read-only")]
    ReadOnly,

    /// Any operation after `close()`
    #[error("invalid operation on closed cache")]
    Closed,

    /// Storage was deleted and `create()` has not been called since
    #[error("cache storage has been deleted; call create() first")]
    Uninitialized,

    /// Value could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored bytes could not be decoded
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Underlying filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::KeyNotFound(_) => StatusCode::NOT_FOUND,
            CacheError::ReservedKey(_)
            | CacheError::InvalidRequest(_)
            | CacheError::Config(_) => StatusCode::BAD_REQUEST,
            CacheError::ReadOnly => StatusCode::FORBIDDEN,
            CacheError::Closed | CacheError::Uninitialized => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::DirectoryNotFound(_)
            | CacheError::Deserialization(_)
            | CacheError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
