//! Data types for product lookups.

use tenantry_domain::{DomainError, DomainResult};
use tenantry_remote::Product;

/// Maximum ids accepted by one lookup request.
pub const MAX_LOOKUP_SIZE: usize = 100;

/// Request for several products at once.
#[derive(Debug, Clone)]
pub struct ProductLookupRequest {
    /// The requested ids. Duplicates are allowed.
    pub ids: Vec<String>,
}

impl ProductLookupRequest {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of a single id within a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductLookupItem {
    /// The requested id.
    pub id: String,
    /// The product, or the error scoped to this id.
    pub result: DomainResult<Product>,
}

/// Response from a lookup, one item per requested id in request order.
#[derive(Debug, Clone)]
pub struct ProductLookupResponse {
    pub results: Vec<ProductLookupItem>,
}

/// Errors that fail a whole lookup request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    /// The request carries no ids.
    #[error("lookup request cannot be empty")]
    EmptyLookup,

    /// The request exceeds the maximum allowed size.
    #[error("lookup size {size} exceeds maximum allowed {max}")]
    LookupTooLarge { size: usize, max: usize },

    /// An id is malformed.
    #[error("invalid id at index {index}: {message}")]
    InvalidId { index: usize, message: String },

    /// Tenant resolution or product fetch failed.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl LookupError {
    /// True for errors caused by the request itself.
    pub fn is_validation(&self) -> bool {
        !matches!(self, LookupError::Domain(_))
    }
}

/// Result type for lookup operations.
pub type LookupResult<T> = Result<T, LookupError>;
