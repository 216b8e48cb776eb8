//! Remote call error types.

use thiserror::Error;

/// Errors returned by a downstream entity client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The access token was rejected by the backend.
    #[error("access token rejected by backend")]
    Unauthorized,

    /// The request was malformed (for example an empty id list).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The call was cancelled through its cancellation signal.
    #[error("call cancelled")]
    Cancelled,

    /// Network or backend failure.
    #[error("transport error: {message}")]
    Transport { message: String },
}

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;
