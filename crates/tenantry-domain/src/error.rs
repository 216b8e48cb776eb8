//! Domain error types for tenant resolution and batched lookups.

use thiserror::Error;

/// Domain-specific errors.
///
/// Errors are `Clone` because a single failure (a failed construction or a
/// failed batch dispatch) is handed to every caller that was waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Tenant bundle construction failed.
    #[error("failed to construct resources for tenant '{tenant}': {message}")]
    Construction { tenant: String, message: String },

    /// The downstream batched call failed as a whole.
    #[error("batch dispatch failed: {message}")]
    BatchDispatch { message: String },

    /// The requested entity was absent from the downstream response.
    #[error("entity not found: {id}")]
    NotFound { id: String },

    /// The caller's wait was abandoned.
    #[error("request cancelled")]
    Cancelled,

    /// The cache is shutting down and no longer hands out resources.
    #[error("resource cache is shutting down")]
    ShuttingDown,

    /// Invalid input from the caller.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl DomainError {
    /// Returns true for errors scoped to a single entity id.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound { .. })
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
