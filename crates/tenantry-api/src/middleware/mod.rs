//! HTTP middleware.
//!
//! Includes:
//! - Request id generation and propagation
//! - Request logging
//! - Request metrics
//! - CORS configuration

mod logging;
mod metrics;
mod request_id;

pub use logging::RequestLoggingLayer;
pub use metrics::{MetricsLayer, RequestMetrics};
pub use request_id::{RequestId, RequestIdLayer, REQUEST_ID_HEADER};

use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS layer.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}
