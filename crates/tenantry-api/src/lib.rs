//! tenantry-api: HTTP API layer
//!
//! This crate provides the API layer including:
//! - HTTP endpoints via Axum
//! - Middleware (request ids, logging, metrics)
//! - Logging and Prometheus metrics setup
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                tenantry-api                  │
//! ├─────────────────────────────────────────────┤
//! │  http/          - HTTP endpoints            │
//! │  middleware/    - Request id, logging       │
//! │  observability/ - Logging, metrics          │
//! │  errors.rs      - Error to status mapping   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod errors;
pub mod http;
pub mod middleware;
pub mod observability;
