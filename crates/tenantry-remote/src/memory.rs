//! In-process product client.
//!
//! Stands in for the RPC transport: every id maps to `Product {id}` unless a
//! catalog restricts the known ids. Latency, revoked tokens and transport
//! failures can be injected so the batching and cache layers can be
//! exercised without a network.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, instrument};

use crate::error::{RemoteError, RemoteResult};
use crate::traits::{CallOptions, Product, RemoteEntityClient};

/// A single `fetch_products_by_ids` invocation observed by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub ids: Vec<String>,
    pub access_token: String,
}

/// In-memory implementation of RemoteEntityClient.
///
/// All state is behind atomics or DashMap so one instance can be shared by
/// every tenant bundle.
#[derive(Debug, Default)]
pub struct MemoryProductClient {
    /// Ids the backend knows about. `None` means every id resolves.
    catalog: Option<HashSet<String>>,
    /// Simulated round-trip time.
    latency: Duration,
    /// Tokens rejected by `authenticate` and by every fetch.
    revoked: DashMap<String, ()>,
    /// Number of upcoming fetches that fail with a transport error.
    pending_failures: AtomicUsize,
    /// Call log keyed by sequence number.
    calls: DashMap<u64, RecordedCall>,
    next_call: AtomicU64,
}

impl MemoryProductClient {
    /// Creates a client that resolves every id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new client wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Restricts the known ids; any other id is omitted from responses.
    pub fn with_catalog<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.catalog = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the simulated round-trip time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Rejects `access_token` from now on.
    pub fn revoke(&self, access_token: impl Into<String>) {
        self.revoked.insert(access_token.into(), ());
    }

    /// Makes the next `count` fetches fail with a transport error.
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.fetch_add(count, Ordering::SeqCst);
    }

    /// Returns every recorded fetch in call order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        let mut calls: Vec<(u64, RecordedCall)> = self
            .calls
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        calls.sort_by_key(|(seq, _)| *seq);
        calls.into_iter().map(|(_, call)| call).collect()
    }

    /// Returns the number of fetches issued so far.
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    fn is_known(&self, id: &str) -> bool {
        self.catalog
            .as_ref()
            .map_or(true, |catalog| catalog.contains(id))
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteEntityClient for MemoryProductClient {
    async fn authenticate(&self, access_token: &str) -> RemoteResult<()> {
        if self.revoked.contains_key(access_token) {
            return Err(RemoteError::Unauthorized);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(batch_size = ids.len()))]
    async fn fetch_products_by_ids(
        &self,
        ids: &[String],
        options: CallOptions,
    ) -> RemoteResult<Vec<Product>> {
        if ids.is_empty() {
            return Err(RemoteError::InvalidRequest {
                message: "ids cannot be empty".to_string(),
            });
        }

        let seq = self.next_call.fetch_add(1, Ordering::SeqCst);
        self.calls.insert(
            seq,
            RecordedCall {
                ids: ids.to_vec(),
                access_token: options.access_token.clone(),
            },
        );
        info!(
            ids = %ids.join(","),
            anonymous = options.access_token.is_empty(),
            "getProductsByIds"
        );

        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => return Err(RemoteError::Cancelled),
            _ = tokio::time::sleep(self.latency) => {}
        }

        if self.revoked.contains_key(&options.access_token) {
            return Err(RemoteError::Unauthorized);
        }
        if self.take_failure() {
            return Err(RemoteError::Transport {
                message: "injected backend failure".to_string(),
            });
        }

        Ok(ids
            .iter()
            .filter(|id| self.is_known(id))
            .map(|id| Product::new(id.clone(), format!("Product {id}")))
            .collect())
    }
}
