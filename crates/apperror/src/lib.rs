//! Classified application error shared by all three services and their
//! HTTP clients.
//!
//! Grounded on the original service's `pkg/common/apperror` package: an
//! error carries a `{type, code, message}` triple that crosses HTTP
//! boundaries verbatim (via [`ErrorEnvelope`]) so that a caller can recover
//! the original classification instead of re-deriving it from a bare status
//! code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The error taxonomy from spec §7. `ServiceUnavailable`, `Timeout`, and
/// `Internal` are retryable; `NotFound`, `InvalidInput`, and `Conflict` are
/// not (see [`ErrorType::is_retryable`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput,
    #[serde(rename = "CONFLICT")]
    Conflict,
    #[serde(rename = "INTERNAL")]
    Internal,
    #[serde(rename = "SERVICE_UNAVAILABLE")]
    ServiceUnavailable,
    #[serde(rename = "TIMEOUT")]
    Timeout,
}

impl ErrorType {
    /// Only these three classes are safe to retry automatically; the rest
    /// represent a classification the caller already has enough
    /// information to act on without a retry.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorType::ServiceUnavailable | ErrorType::Timeout | ErrorType::Internal
        )
    }

    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorType::Conflict => StatusCode::CONFLICT,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorType::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorType::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The classified application error. Every service-layer fallible
/// operation in this workspace returns `Result<_, AppError>`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{error_type:?}] {code}: {message}")]
pub struct AppError {
    pub error_type: ErrorType,
    pub code: u32,
    pub message: String,
}

impl AppError {
    pub fn new(error_type: ErrorType, code: u32, message: impl Into<String>) -> Self {
        Self {
            error_type,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorType::NotFound, 40400, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorType::InvalidInput, 40000, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Conflict, 40900, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Internal, 50000, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorType::ServiceUnavailable, 50300, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Timeout, 50400, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.error_type.is_retryable()
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        AppError::internal(format!("database error: {err}"))
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        AppError::internal(format!("connection pool error: {err}"))
    }
}

/// The uniform non-2xx envelope from spec §6: `{code, message, type}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u32,
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
}

impl From<&AppError> for ErrorEnvelope {
    fn from(err: &AppError) -> Self {
        ErrorEnvelope {
            code: err.code,
            message: err.message.clone(),
            error_type: err.error_type,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.error_type.http_status();
        let envelope = ErrorEnvelope::from(&self);
        (status, Json(envelope)).into_response()
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::InvalidInput => "INVALID_INPUT",
            ErrorType::Conflict => "CONFLICT",
            ErrorType::Internal => "INTERNAL",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorType::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_classes_are_retryable() {
        assert!(ErrorType::ServiceUnavailable.is_retryable());
        assert!(ErrorType::Timeout.is_retryable());
        assert!(ErrorType::Internal.is_retryable());
        assert!(!ErrorType::NotFound.is_retryable());
        assert!(!ErrorType::InvalidInput.is_retryable());
        assert!(!ErrorType::Conflict.is_retryable());
    }

    #[test]
    fn envelope_round_trips_error_type() {
        let err = AppError::conflict("insufficient stock");
        let envelope = ErrorEnvelope::from(&err);
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"CONFLICT\""));
        let back: ErrorEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.error_type, ErrorType::Conflict);
        assert_eq!(back.code, 40900);
    }

    #[test]
    fn http_status_mapping_matches_taxonomy() {
        assert_eq!(ErrorType::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorType::InvalidInput.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorType::Conflict.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorType::ServiceUnavailable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorType::Timeout.http_status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ErrorType::Internal.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
