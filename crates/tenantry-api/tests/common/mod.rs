//! Shared helpers for the tenantry API integration tests.

// Each test file compiles this module separately and uses a different subset.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request},
    Router,
};

use tenantry_api::http::{create_router, AppState};
use tenantry_domain::{BatchConfig, CacheConfig, TenantResourceCache};
use tenantry_remote::MemoryProductClient;
use tenantry_server::{handlers::products::ProductLookupHandler, TenantBundleFactory};

/// Number of tenants used by the concurrency tests.
pub const CONCURRENT_TENANT_COUNT: usize = 20;

/// A router wired to an in-process backend, with handles for assertions.
pub struct TestServer {
    pub router: Router,
    pub remote: Arc<MemoryProductClient>,
    pub cache: TenantResourceCache<TenantBundleFactory>,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_remote(MemoryProductClient::new_shared(), CacheConfig::default())
    }

    pub fn with_remote(remote: Arc<MemoryProductClient>, cache_config: CacheConfig) -> Self {
        let factory = TenantBundleFactory::new(remote.clone(), BatchConfig::default());
        let cache = TenantResourceCache::new(Arc::new(factory), cache_config);
        let state = AppState::new(ProductLookupHandler::new(cache.clone()));

        Self {
            router: create_router(state),
            remote,
            cache,
        }
    }
}

pub fn get_product(id: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(format!("/v1/products/{id}"));
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn lookup(ids: &[&str], token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/products/lookup")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "ids": ids }).to_string()))
        .unwrap()
}

pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
