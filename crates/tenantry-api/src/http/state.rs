//! Application state for HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use tenantry_server::handlers::products::ProductLookupHandler;

use crate::middleware::RequestMetrics;

/// Default time limit for one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// State shared by every HTTP handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Serves product lookups from the tenant cache.
    pub handler: ProductLookupHandler,
    /// Requests running longer are cancelled with 504.
    pub request_timeout: Duration,
    /// HTTP request counters.
    pub request_metrics: Arc<RequestMetrics>,
}

impl AppState {
    pub fn new(handler: ProductLookupHandler) -> Self {
        Self {
            handler,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            request_metrics: Arc::new(RequestMetrics::new()),
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}
