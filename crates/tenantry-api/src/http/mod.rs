//! HTTP REST API endpoints.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `{endpoint}/products/{id}` | GET | Fetch one product |
//! | `{endpoint}/products/lookup` | POST | Fetch several products in one call |
//! | `/health` | GET | Liveness probe |
//! | `/ready` | GET | Readiness probe with tenant cache occupancy |
//! | `/metrics` | GET | Prometheus metrics |
//!
//! `{endpoint}` defaults to `/v1`. The caller's tenant is taken from the
//! `Authorization` header.

pub mod routes;
pub mod state;

pub use routes::{
    create_router, create_router_with_endpoint, create_router_with_observability,
    DEFAULT_BODY_LIMIT, DEFAULT_ENDPOINT,
};
pub use state::{AppState, DEFAULT_REQUEST_TIMEOUT};
