//! Product lookup handler.
//!
//! Resolves the caller's tenant bundle through the tenant resource cache and
//! issues every requested id as its own lookup against a resolver scoped to
//! the request. Deduplication and batching happen in the resolver:
//!
//! 1. **Deduplication**: an id requested several times is fetched once
//! 2. **Batching**: all ids of the request share one backend call
//! 3. **Isolation**: an unknown id fails only its own result
//!
//! A failure to construct the tenant bundle fails the whole request; a
//! failed backend call fails every item that was part of it.

mod handler;
mod types;

pub use handler::ProductLookupHandler;
pub use types::{
    LookupError, LookupResult, ProductLookupItem, ProductLookupRequest, ProductLookupResponse,
    MAX_LOOKUP_SIZE,
};
