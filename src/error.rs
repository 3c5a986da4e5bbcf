//! Error types for the file cache
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
/// Unified error type for the file cache.
///
/// Only [`CacheError::LockTimeout`] ever escapes the public cache operations;
/// every other variant is logged and turned into a miss by the facade.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key has expired
    #[error("Key expired: {0}")]
    Expired(String),

    /// Stored entry failed to decode or its checksum did not match
    #[error("Corrupted entry: {0}")]
    Corrupted(String),

    /// Entry is larger than the configured maximum
    #[error("Entry of {size} bytes exceeds maximum of {max} bytes")]
    CapacityExceeded { size: usize, max: usize },

    /// Per-key write lock could not be acquired in time
    #[error("Timed out acquiring lock: {0}")]
    LockTimeout(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Short label used in log lines so misses stay distinguishable.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::NotFound(_) => "not_found",
            CacheError::Expired(_) => "expired",
            CacheError::Corrupted(_) => "corrupted",
            CacheError::CapacityExceeded { .. } => "capacity",
            CacheError::LockTimeout(_) => "lock_timeout",
            CacheError::Io(_) => "io",
            CacheError::InvalidRequest(_) => "invalid_request",
            CacheError::Internal(_) => "internal",
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) | CacheError::Expired(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::CapacityExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Corrupted(_) | CacheError::Io(_) | CacheError::Internal(_) => {
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
/// Convenience Result type for the file cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CacheError::NotFound("k".into()), StatusCode::NOT_FOUND),
            (CacheError::Expired("k".into()), StatusCode::NOT_FOUND),
            (CacheError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (
                CacheError::CapacityExceeded { size: 10, max: 5 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (CacheError::LockTimeout("k".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                CacheError::Corrupted("crc".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CacheError = io.into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_capacity_message() {
        let err = CacheError::CapacityExceeded { size: 12, max: 8 };
        assert_eq!(err.to_string(), "Entry of 12 bytes exceeds maximum of 8 bytes");
    }
}
