/// Unified error types for Groupwarden
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the moderation backend
#[derive(Error, Debug)]
pub enum WardenError {
    /// Local persistence failures
    #[error("Storage error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing, malformed or unverifiable session payload or token
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authenticated but not privileged enough
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Target admin, group or ban is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate ban, admin or group
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad id format, points out of range and similar
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Mute duration could not be parsed
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Chat platform RPC failures
    #[error("Platform error: {0}")]
    Platform(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl WardenError {
    /// HTTP status and machine-readable code for this error
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            WardenError::Authentication(_) => (StatusCode::UNAUTHORIZED, "AuthError"),
            WardenError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            WardenError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            WardenError::Conflict(_) => (StatusCode::BAD_REQUEST, "Conflict"),
            WardenError::Validation(_) => (StatusCode::BAD_REQUEST, "InvalidInput"),
            WardenError::InvalidDuration(_) => (StatusCode::BAD_REQUEST, "InvalidDuration"),
            WardenError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RateLimitExceeded")
            }
            WardenError::Platform(_) => (StatusCode::BAD_GATEWAY, "PlatformError"),
            WardenError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "StorageError"),
            WardenError::Internal(_) | WardenError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError")
            }
        }
    }
}

/// Convert WardenError to HTTP response
impl IntoResponse for WardenError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status();

        let message = match self {
            WardenError::Database(ref e) => {
                tracing::error!("Storage failure: {}", e);
                "Internal server error".to_string() // Don't leak details
            }
            WardenError::Internal(ref e) => {
                tracing::error!("Internal failure: {}", e);
                "Internal server error".to_string()
            }
            WardenError::Io(ref e) => {
                tracing::error!("IO failure: {}", e);
                "Internal server error".to_string()
            }
            WardenError::RateLimitExceeded { .. } => "Rate limit exceeded".to_string(),
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for moderation operations
pub type WardenResult<T> = Result<T, WardenError>;

/// True when a storage error is a uniqueness violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            WardenError::Authentication("x".into()).status().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(WardenError::Forbidden("x".into()).status().0, StatusCode::FORBIDDEN);
        assert_eq!(WardenError::NotFound("x".into()).status().0, StatusCode::NOT_FOUND);
        assert_eq!(WardenError::Conflict("x".into()).status().0, StatusCode::BAD_REQUEST);
        assert_eq!(
            WardenError::InvalidDuration("x".into()).status().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WardenError::Database(sqlx::Error::RowNotFound).status().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_errors_hide_details() {
        let response = WardenError::Internal("secret path /var/db".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
