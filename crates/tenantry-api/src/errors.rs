//! Error responses and their HTTP status codes.
//!
//! Every failure reaching the HTTP layer becomes an [`ApiError`] with a
//! stable `code`. The status code is derived from the code, so handlers and
//! per-item lookup results classify errors the same way.
//!
//! | Error | Code | Status |
//! |-------|------|--------|
//! | `NotFound` | `not_found` | 404 |
//! | validation failures | `validation_error` | 400 |
//! | `Construction` | `construction_failed` | 502 |
//! | `BatchDispatch` | `upstream_error` | 502 |
//! | `Cancelled` | `cancelled` | 503 |
//! | `ShuttingDown` | `service_unavailable` | 503 |
//! | request timeout | `timeout` | 504 |

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::warn;

use tenantry_domain::DomainError;
use tenantry_server::handlers::products::LookupError;

/// Stable error codes returned in the `code` field.
pub mod error_codes {
    /// The requested entity does not exist.
    pub const NOT_FOUND: &str = "not_found";
    /// The request is malformed.
    pub const VALIDATION_ERROR: &str = "validation_error";
    /// The caller's tenant resources could not be constructed.
    pub const CONSTRUCTION_FAILED: &str = "construction_failed";
    /// The backend call failed.
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    /// The request was abandoned before it completed.
    pub const CANCELLED: &str = "cancelled";
    /// The server is shutting down.
    pub const SERVICE_UNAVAILABLE: &str = "service_unavailable";
    /// The request exceeded its time limit.
    pub const TIMEOUT: &str = "timeout";
    /// Request body exceeds the configured limit.
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    /// Unexpected internal error.
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// API error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error (400).
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::VALIDATION_ERROR, message)
    }

    /// Creates a not found error (404).
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(error_codes::NOT_FOUND, message)
    }

    /// Creates a timeout error (504).
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(error_codes::TIMEOUT, message)
    }

    /// The HTTP status for this error's code.
    pub fn status(&self) -> StatusCode {
        use error_codes::*;

        match self.code.as_str() {
            NOT_FOUND => StatusCode::NOT_FOUND,
            VALIDATION_ERROR => StatusCode::BAD_REQUEST,
            CONSTRUCTION_FAILED | UPSTREAM_ERROR => StatusCode::BAD_GATEWAY,
            CANCELLED | SERVICE_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
            TIMEOUT => StatusCode::GATEWAY_TIMEOUT,
            PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        use error_codes::*;

        match &err {
            DomainError::NotFound { id } => ApiError::not_found(format!("product '{id}' not found")),
            DomainError::Construction { .. } => {
                warn!(error = %err, "tenant construction failed");
                ApiError::new(CONSTRUCTION_FAILED, err.to_string())
            }
            DomainError::BatchDispatch { .. } => {
                warn!(error = %err, "backend call failed");
                // The transport message stays in the logs.
                ApiError::new(UPSTREAM_ERROR, "product backend call failed")
            }
            DomainError::Cancelled => ApiError::new(CANCELLED, err.to_string()),
            DomainError::ShuttingDown => ApiError::new(SERVICE_UNAVAILABLE, err.to_string()),
            DomainError::InvalidRequest { message } => ApiError::validation_error(message.clone()),
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::Domain(domain) => domain.into(),
            validation => ApiError::validation_error(validation.to_string()),
        }
    }
}

/// Result type for HTTP handlers.
pub type ApiResult<T> = Result<T, ApiError>;
