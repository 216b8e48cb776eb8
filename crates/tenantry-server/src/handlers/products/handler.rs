//! Product lookup handler implementation.

use futures::future::join_all;
use tracing::debug;

use tenantry_domain::{RequestContext, TenantResourceCache};
use tenantry_remote::Product;

use crate::bundle::TenantBundleFactory;

use super::types::{
    LookupError, LookupResult, ProductLookupItem, ProductLookupRequest, ProductLookupResponse,
    MAX_LOOKUP_SIZE,
};

/// Handler for product lookups.
///
/// Cloning is cheap; clones share the tenant cache.
#[derive(Clone, Debug)]
pub struct ProductLookupHandler {
    cache: TenantResourceCache<TenantBundleFactory>,
}

impl ProductLookupHandler {
    /// Creates a handler serving from `cache`.
    pub fn new(cache: TenantResourceCache<TenantBundleFactory>) -> Self {
        Self { cache }
    }

    /// Returns the tenant cache behind this handler.
    pub fn cache(&self) -> &TenantResourceCache<TenantBundleFactory> {
        &self.cache
    }

    /// Validates a lookup request.
    pub fn validate(&self, request: &ProductLookupRequest) -> LookupResult<()> {
        if request.ids.is_empty() {
            return Err(LookupError::EmptyLookup);
        }

        if request.ids.len() > MAX_LOOKUP_SIZE {
            return Err(LookupError::LookupTooLarge {
                size: request.ids.len(),
                max: MAX_LOOKUP_SIZE,
            });
        }

        for (index, id) in request.ids.iter().enumerate() {
            validate_id(index, id)?;
        }

        Ok(())
    }

    /// Fetches a single product for the caller in `ctx`.
    pub async fn get_product(&self, ctx: &RequestContext, id: &str) -> LookupResult<Product> {
        validate_id(0, id)?;

        let bundle = self.cache.acquire(ctx.tenant_key()).await?;
        let product = bundle.products(ctx).fetch(id).await?;
        Ok(product)
    }

    /// Fetches several products for the caller in `ctx`.
    ///
    /// Results are returned in request order. Each id is issued as its own
    /// lookup; the request's resolver merges them into one backend call.
    pub async fn lookup(
        &self,
        ctx: &RequestContext,
        request: ProductLookupRequest,
    ) -> LookupResult<ProductLookupResponse> {
        self.validate(&request)?;

        let bundle = self.cache.acquire(ctx.tenant_key()).await?;
        let products = bundle.products(ctx);

        let lookups = join_all(request.ids.iter().map(|id| products.fetch(id)));
        // Every lookup has joined the window once `join_all` is first polled;
        // dispatch right away instead of waiting for the window delay.
        let (outcomes, ()) = tokio::join!(lookups, async { products.drain() });

        debug!(
            request_id = %ctx.request_id,
            tenant = %ctx.tenant_key(),
            requested = request.ids.len(),
            elapsed_ms = ctx.started_at.elapsed().as_millis() as u64,
            "product lookup completed"
        );

        let results = request
            .ids
            .into_iter()
            .zip(outcomes)
            .map(|(id, result)| ProductLookupItem { id, result })
            .collect();

        Ok(ProductLookupResponse { results })
    }

    /// [`get_product`](Self::get_product) for the request bound with
    /// [`RequestContext::scope`].
    pub async fn get_current_product(&self, id: &str) -> LookupResult<Product> {
        let ctx = RequestContext::current()?;
        self.get_product(&ctx, id).await
    }

    /// [`lookup`](Self::lookup) for the request bound with
    /// [`RequestContext::scope`].
    pub async fn lookup_current(
        &self,
        request: ProductLookupRequest,
    ) -> LookupResult<ProductLookupResponse> {
        let ctx = RequestContext::current()?;
        self.lookup(&ctx, request).await
    }
}

fn validate_id(index: usize, id: &str) -> LookupResult<()> {
    if id.trim().is_empty() {
        return Err(LookupError::InvalidId {
            index,
            message: "id cannot be empty".to_string(),
        });
    }
    Ok(())
}
