//! Per-call request context and tenant identity.
//!
//! Every inbound call derives a [`RequestContext`] from its credentials. The
//! transport binds it for the duration of the call with
//! [`RequestContext::scope`]; core logic reads it back with
//! [`RequestContext::current`].

use std::fmt;
use std::future::Future;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::error::{DomainError, DomainResult};

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Opaque tenant identity, used as the resource cache key.
///
/// An empty key is the anonymous tenant. The key is the caller's token, so
/// `Display` and `Debug` print [`TenantKey::fingerprint`] instead.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantKey(String);

impl TenantKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key shared by every caller without credentials.
    pub fn anonymous() -> Self {
        Self(String::new())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw key. Only the backend client should see this.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable, non-reversible id for logs and error messages: `anonymous`,
    /// or `t-` followed by the first 12 hex digits of the key's SHA-256.
    pub fn fingerprint(&self) -> String {
        if self.is_anonymous() {
            return "anonymous".to_string();
        }
        let digest = Sha256::digest(self.0.as_bytes());
        format!("t-{}", hex::encode(&digest[..6]))
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

impl fmt::Debug for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TenantKey").field(&self.fingerprint()).finish()
    }
}

impl From<&str> for TenantKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TenantKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Caller credentials, created once per inbound call and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    tenant_key: TenantKey,
}

impl Credentials {
    pub fn new(tenant_key: impl Into<TenantKey>) -> Self {
        Self {
            tenant_key: tenant_key.into(),
        }
    }

    /// Builds credentials from an `Authorization` header value.
    ///
    /// A `Bearer ` prefix is stripped; a missing header yields the
    /// anonymous tenant.
    pub fn from_authorization(header: Option<&str>) -> Self {
        let raw = header.unwrap_or_default();
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
        Self::new(token)
    }

    pub fn tenant_key(&self) -> &TenantKey {
        &self.tenant_key
    }

    /// The token forwarded to the backend on every call.
    pub fn access_token(&self) -> &str {
        self.tenant_key.as_str()
    }
}

/// Per-call record threading the tenant identity to the cache.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id (usually the `x-request-id` header).
    pub request_id: String,
    /// Credentials of the caller.
    pub credentials: Credentials,
    /// Cancelled when the inbound call is abandoned.
    pub cancel: CancellationToken,
    /// Arrival time of the call.
    pub started_at: Instant,
}

impl RequestContext {
    /// Creates a context with a generated request id and a fresh cancel token.
    pub fn new(credentials: Credentials) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), credentials)
    }

    /// Creates a context with a caller-supplied request id.
    pub fn with_id(request_id: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            request_id: request_id.into(),
            credentials,
            cancel: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    pub fn tenant_key(&self) -> &TenantKey {
        self.credentials.tenant_key()
    }

    /// Runs `future` with this context bound as the active request.
    pub async fn scope<F>(self, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, future).await
    }

    /// Returns the context bound by the enclosing [`RequestContext::scope`].
    pub fn try_current() -> Option<Self> {
        CURRENT.try_with(RequestContext::clone).ok()
    }

    /// Like [`RequestContext::try_current`], but an unbound context is an error.
    pub fn current() -> DomainResult<Self> {
        Self::try_current().ok_or_else(|| DomainError::InvalidRequest {
            message: "no request context bound to the current task".to_string(),
        })
    }
}
