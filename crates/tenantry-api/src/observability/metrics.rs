//! Prometheus metrics infrastructure.
//!
//! Metrics are recorded through the `metrics` facade and exposed by
//! `metrics-exporter-prometheus`.
//!
//! # Metrics Exposed
//!
//! - `tenantry_http_requests_total` - HTTP requests by method, path, status class
//! - `tenantry_http_request_duration_seconds` - HTTP request duration histogram
//! - `tenantry_cache_hits_total` / `tenantry_cache_misses_total` - tenant cache lookups
//! - `tenantry_bundle_constructions_total` / `tenantry_bundle_evictions_total` - bundle lifecycle
//! - `tenantry_batch_dispatches_total` / `tenantry_batch_size` - batched backend calls

use std::sync::Arc;

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Shared state containing the Prometheus handle for metrics rendering.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Error type for metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the global Prometheus recorder.
///
/// Must be called once, before any metric is recorded.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    register_default_metrics();

    Ok(MetricsState::new(handle))
}

fn register_default_metrics() {
    metrics::describe_counter!(
        "tenantry_http_requests_total",
        "Total number of HTTP requests"
    );
    metrics::describe_histogram!(
        "tenantry_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    tenantry_domain::cache::register_cache_metrics();
    tenantry_domain::loader::register_batch_metrics();
}

/// Prometheus exposition format content type.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler for the `/metrics` endpoint.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.render())
}
