//! Adapters that bridge the remote client to the domain layer.
//!
//! The domain layer (tenantry-domain) batches lookups through the abstract
//! [`BatchLoader`] trait. The remote layer (tenantry-remote) implements
//! [`RemoteEntityClient`] against the product backend. [`ProductLoader`]
//! connects the two for one tenant's credentials.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tenantry_domain::{BatchLoader, DomainError, DomainResult, TenantKey};
use tenantry_remote::{CallOptions, Product, RemoteEntityClient, RemoteError};

/// Maps a transport error onto the domain taxonomy.
///
/// A cancelled call stays a cancellation; anything else fails the batch.
pub fn remote_to_domain(err: RemoteError) -> DomainError {
    match err {
        RemoteError::Cancelled => DomainError::Cancelled,
        other => DomainError::BatchDispatch {
            message: other.to_string(),
        },
    }
}

/// Batch loader for products, carrying one tenant's access token.
pub struct ProductLoader {
    remote: Arc<dyn RemoteEntityClient>,
    access_token: String,
}

impl ProductLoader {
    /// Creates a loader that calls `remote` with `access_token`.
    pub fn new(remote: Arc<dyn RemoteEntityClient>, access_token: impl Into<String>) -> Self {
        Self {
            remote,
            access_token: access_token.into(),
        }
    }
}

impl std::fmt::Debug for ProductLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductLoader")
            .field("tenant", &TenantKey::new(self.access_token.as_str()))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BatchLoader for ProductLoader {
    type Value = Product;

    async fn load(
        &self,
        ids: Vec<String>,
        cancel: CancellationToken,
    ) -> DomainResult<HashMap<String, Product>> {
        let options = CallOptions::new(self.access_token.clone(), cancel);
        let products = self
            .remote
            .fetch_products_by_ids(&ids, options)
            .await
            .map_err(remote_to_domain)?;

        Ok(products
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect())
    }
}
