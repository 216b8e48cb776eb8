//! tenantry-domain: Core tenant resource and batching logic
//!
//! This crate contains the core request-serving mechanisms:
//! - Request context and tenant identity
//! - Keyed, idle-evicted tenant resource cache
//! - Per-request batching and deduplicating resolver
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               tenantry-domain                │
//! ├─────────────────────────────────────────────┤
//! │  context.rs - TenantKey, RequestContext     │
//! │  cache/     - Tenant resource cache         │
//! │  loader/    - Batch resolver and windows    │
//! │  error.rs   - Domain error taxonomy         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod context;
pub mod error;
pub mod loader;

// Re-export commonly used types at the crate root
pub use cache::{CacheConfig, CacheStats, Lease, ResourceFactory, TenantResourceCache};
pub use context::{Credentials, RequestContext, TenantKey};
pub use error::{DomainError, DomainResult};
pub use loader::{BatchConfig, BatchLoader, BatchResolver};
