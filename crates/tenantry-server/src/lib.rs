//! tenantry-server: Tenant bundles and request handlers
//!
//! This crate wires the domain mechanisms to the product backend:
//! - Tenant service bundle and its cache factory
//! - Adapter from the remote client to the batch loader contract
//! - Product lookup handler
//! - Configuration management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               tenantry-server                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  bundle.rs   - TenantServiceBundle, factory │
//! │  adapters.rs - Remote client → BatchLoader  │
//! │  handlers/   - Request handlers             │
//! │    products/      - Product lookups         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod bundle;
pub mod config;
pub mod handlers;

// Re-exports for convenience
pub use bundle::{TenantBundleFactory, TenantClient, TenantServiceBundle};
pub use config::{ConfigLoadError, ServerConfig};
