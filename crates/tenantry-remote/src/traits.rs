//! RemoteEntityClient trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::RemoteResult;

/// A product record returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Per-call options: the caller's credentials and its cancellation signal.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Access token sent with the call (the `accessToken` header).
    pub access_token: String,
    /// Cancelling this token abandons the call.
    pub cancel: CancellationToken,
}

impl CallOptions {
    pub fn new(access_token: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            access_token: access_token.into(),
            cancel,
        }
    }
}

/// Batch-capable client for the backend product service.
///
/// Implementations must be thread-safe (Send + Sync). A response may omit
/// ids the backend does not know about; callers treat an omitted id as
/// not found rather than as a failure of the whole call.
#[async_trait]
pub trait RemoteEntityClient: Send + Sync + 'static {
    /// Validates an access token before any lookups are issued with it.
    ///
    /// Default implementation accepts every token.
    async fn authenticate(&self, _access_token: &str) -> RemoteResult<()> {
        Ok(())
    }

    /// Fetches the products with the given ids in a single round-trip.
    ///
    /// `ids` must be non-empty and free of duplicates.
    async fn fetch_products_by_ids(
        &self,
        ids: &[String],
        options: CallOptions,
    ) -> RemoteResult<Vec<Product>>;
}
