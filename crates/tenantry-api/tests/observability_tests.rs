//! Metrics endpoint and request id propagation through the full router.
//!
//! Only one Prometheus recorder can be installed per process, so every test
//! needing `/metrics` shares the one installed here.

mod common;

use std::sync::{Arc, OnceLock};

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use tenantry_api::http::{create_router_with_observability, AppState};
use tenantry_api::middleware::REQUEST_ID_HEADER;
use tenantry_api::observability::{init_metrics, MetricsState};
use tenantry_domain::{BatchConfig, CacheConfig, TenantResourceCache};
use tenantry_remote::MemoryProductClient;
use tenantry_server::{handlers::products::ProductLookupHandler, TenantBundleFactory};

use common::*;

static METRICS: OnceLock<MetricsState> = OnceLock::new();

fn metrics_state() -> MetricsState {
    METRICS
        .get_or_init(|| init_metrics().expect("recorder installed once"))
        .clone()
}

fn observed_app() -> Router {
    let remote = MemoryProductClient::new_shared();
    let factory = TenantBundleFactory::new(remote.clone(), BatchConfig::default());
    let cache = TenantResourceCache::new(Arc::new(factory), CacheConfig::default());
    let state = AppState::new(ProductLookupHandler::new(cache));
    create_router_with_observability(state, metrics_state(), "/v1")
}

async fn metrics_text(app: Router) -> String {
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_cache_batch_and_http_series() {
    let app = observed_app();

    let response = app
        .clone()
        .oneshot(lookup(&["1", "2", "1"], "tenant-metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = metrics_text(app).await;
    assert!(text.contains("tenantry_cache_misses_total"));
    assert!(text.contains("tenantry_bundle_constructions_total"));
    assert!(text.contains("tenantry_batch_dispatches_total"));
    assert!(text.contains("tenantry_http_requests_total"));
}

#[tokio::test]
async fn test_request_id_is_echoed_on_error_responses() {
    let app = observed_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/products/lookup")
                .header(REQUEST_ID_HEADER, "trace-me")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "trace-me");
}
