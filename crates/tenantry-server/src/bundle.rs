//! Tenant service bundles and the factory the cache builds them with.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use tenantry_domain::{
    BatchConfig, BatchResolver, DomainError, DomainResult, RequestContext, ResourceFactory,
    TenantKey,
};
use tenantry_remote::RemoteEntityClient;

use crate::adapters::ProductLoader;

/// Remote client handle bound to one tenant's access token.
#[derive(Clone)]
pub struct TenantClient {
    remote: Arc<dyn RemoteEntityClient>,
    access_token: String,
}

impl TenantClient {
    pub fn new(remote: Arc<dyn RemoteEntityClient>, access_token: impl Into<String>) -> Self {
        Self {
            remote,
            access_token: access_token.into(),
        }
    }

    /// The token attached to every call made through this handle.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn remote(&self) -> &Arc<dyn RemoteEntityClient> {
        &self.remote
    }
}

impl std::fmt::Debug for TenantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantClient")
            .field("tenant", &TenantKey::new(self.access_token.as_str()))
            .finish_non_exhaustive()
    }
}

/// Resources scoped to one tenant.
///
/// Never mutated after construction; shared by every concurrent request of
/// the tenant through cache leases.
#[derive(Debug)]
pub struct TenantServiceBundle {
    tenant_key: TenantKey,
    client: TenantClient,
    loader: Arc<ProductLoader>,
    batch: BatchConfig,
    created_at: Instant,
}

impl TenantServiceBundle {
    pub fn new(tenant_key: TenantKey, client: TenantClient, batch: BatchConfig) -> Self {
        let loader = Arc::new(ProductLoader::new(
            Arc::clone(client.remote()),
            client.access_token(),
        ));
        Self {
            tenant_key,
            client,
            loader,
            batch,
            created_at: Instant::now(),
        }
    }

    pub fn tenant_key(&self) -> &TenantKey {
        &self.tenant_key
    }

    pub fn client(&self) -> &TenantClient {
        &self.client
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Product resolver for one logical request.
    ///
    /// Lookups are batched only within the returned resolver, so requests
    /// of the same tenant never share a batch window. Cancelling the
    /// request cancels its pending lookups.
    pub fn products(&self, ctx: &RequestContext) -> BatchResolver<ProductLoader> {
        BatchResolver::new(
            Arc::clone(&self.loader),
            self.batch.clone(),
            ctx.cancel.child_token(),
        )
    }
}

/// Builds [`TenantServiceBundle`]s for the tenant resource cache.
pub struct TenantBundleFactory {
    remote: Arc<dyn RemoteEntityClient>,
    batch: BatchConfig,
}

impl TenantBundleFactory {
    pub fn new(remote: Arc<dyn RemoteEntityClient>, batch: BatchConfig) -> Self {
        Self { remote, batch }
    }
}

#[async_trait]
impl ResourceFactory for TenantBundleFactory {
    type Resource = TenantServiceBundle;

    async fn build(&self, key: &TenantKey) -> DomainResult<TenantServiceBundle> {
        debug!(tenant = %key, "authenticating tenant");
        self.remote
            .authenticate(key.as_str())
            .await
            .map_err(|err| DomainError::Construction {
                tenant: key.to_string(),
                message: err.to_string(),
            })?;

        info!(tenant = %key, "constructing tenant bundle");
        let client = TenantClient::new(Arc::clone(&self.remote), key.as_str());
        Ok(TenantServiceBundle::new(
            key.clone(),
            client,
            self.batch.clone(),
        ))
    }

    async fn teardown(&self, key: &TenantKey, bundle: &TenantServiceBundle) {
        info!(
            tenant = %key,
            age_ms = bundle.created_at().elapsed().as_millis() as u64,
            "destroying tenant bundle"
        );
    }
}
