//! tenantry-remote: Downstream entity client abstraction
//!
//! This crate provides the contract the core uses to reach the backend
//! product service, including:
//! - RemoteEntityClient trait for batch-capable lookups
//! - In-memory product client that simulates the RPC transport
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              tenantry-remote                 │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs - RemoteEntityClient definition  │
//! │  memory.rs - In-process product client      │
//! │  error.rs  - Remote call errors             │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{RemoteError, RemoteResult};
pub use memory::{MemoryProductClient, RecordedCall};
pub use traits::{CallOptions, Product, RemoteEntityClient};
