//! Per-request batching and deduplication of entity lookups.
//!
//! A [`BatchResolver`] collects the single-id lookups issued while one
//! request is handled. Lookups made within the same window are merged into
//! one call to the [`BatchLoader`] carrying each distinct id once; every
//! caller then receives its own record or its own error.
//!
//! # Architecture
//!
//! ```text
//! fetch("1") ─┐
//! fetch("2") ─┼──► open window ──(delay | full | drain)──► loader.load(["1","2"])
//! fetch("1") ─┘        │                                        │
//!                      │ oneshot per caller ◄── fan out by id ──┘
//!                      ▼
//!               later fetches open a new window
//! ```
//!
//! A window is dispatched when its coalescing delay elapses, when it holds
//! `max_batch_size` distinct ids, or when the holder calls
//! [`BatchResolver::drain`]. A window whose callers all gave up before
//! dispatch is discarded without calling the loader.

mod window;


use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DomainError, DomainResult};

use window::BatchWindow;

/// Configuration for a batch resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// How long a window stays open for lookups to join.
    pub window: Duration,
    /// Maximum distinct ids per backend call.
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(2),
            max_batch_size: 100,
        }
    }
}

impl BatchConfig {
    /// Sets the coalescing window.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets the maximum distinct ids per call. Values below one are
    /// treated as one.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }
}

/// Resolves many ids with a single backend call.
#[async_trait]
pub trait BatchLoader: Send + Sync + 'static {
    /// The record returned per id.
    type Value: Clone + Send + Sync + 'static;

    /// Loads the records for `ids`, which are distinct and non-empty.
    ///
    /// Ids without a record are simply left out of the map. An error fails
    /// every caller of the batch. `cancel` fires when the owning request is
    /// abandoned.
    async fn load(
        &self,
        ids: Vec<String>,
        cancel: CancellationToken,
    ) -> DomainResult<HashMap<String, Self::Value>>;
}

/// Request-scoped resolver that coalesces lookups into batches.
///
/// Create one per logical request; batching never crosses requests.
pub struct BatchResolver<L: BatchLoader> {
    loader: Arc<L>,
    config: BatchConfig,
    cancel: CancellationToken,
    open: Mutex<Option<Arc<BatchWindow<L::Value>>>>,
}

impl<L: BatchLoader> std::fmt::Debug for BatchResolver<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchResolver")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl<L: BatchLoader> BatchResolver<L> {
    /// Creates a resolver bound to a request's cancellation token.
    pub fn new(loader: Arc<L>, config: BatchConfig, cancel: CancellationToken) -> Self {
        let config = BatchConfig {
            max_batch_size: config.max_batch_size.max(1),
            ..config
        };
        Self {
            loader,
            config,
            cancel,
            open: Mutex::new(None),
        }
    }

    /// Returns the configuration for this resolver.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Looks up a single id.
    ///
    /// The lookup joins the open window and resolves once that window has
    /// been dispatched. A missing record yields [`DomainError::NotFound`]
    /// for this caller only.
    pub async fn fetch(&self, id: &str) -> DomainResult<L::Value> {
        if self.cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        let receiver = self.enqueue(id);
        self.wait(receiver).await
    }

    /// Looks up several ids in one window and dispatches it immediately.
    ///
    /// Results are returned in input order; duplicates share one lookup.
    pub async fn fetch_many(&self, ids: &[String]) -> Vec<DomainResult<L::Value>> {
        if self.cancel.is_cancelled() {
            return ids.iter().map(|_| Err(DomainError::Cancelled)).collect();
        }
        let receivers: Vec<_> = ids.iter().map(|id| self.enqueue(id)).collect();
        self.drain();
        join_all(receivers.into_iter().map(|receiver| self.wait(receiver))).await
    }

    /// Dispatches the open window without waiting for its delay.
    pub fn drain(&self) {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(window) = open.as_ref() {
            window.request_flush();
        }
    }

    fn enqueue(&self, id: &str) -> oneshot::Receiver<DomainResult<L::Value>> {
        let max = self.config.max_batch_size;
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(joined) = open.as_ref().and_then(|window| window.join(id, max)) {
            if joined.full {
                if let Some(window) = open.as_ref() {
                    window.request_flush();
                }
            }
            return joined.receiver;
        }

        // No window accepting this id; open a fresh one.
        let (window, joined) = BatchWindow::opened_with(id, max);
        let window = Arc::new(window);
        if joined.full {
            window.request_flush();
        }
        self.spawn_dispatch(Arc::clone(&window));
        *open = Some(window);
        joined.receiver
    }

    async fn wait(
        &self,
        receiver: oneshot::Receiver<DomainResult<L::Value>>,
    ) -> DomainResult<L::Value> {
        tokio::select! {
            biased;
            result = receiver => result.unwrap_or(Err(DomainError::Cancelled)),
            _ = self.cancel.cancelled() => Err(DomainError::Cancelled),
        }
    }

    fn spawn_dispatch(&self, window: Arc<BatchWindow<L::Value>>) {
        let loader = Arc::clone(&self.loader);
        let delay = self.config.window;
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = window.flush_requested() => {}
                _ = cancel.cancelled() => {}
            }

            let mut pending = window.close();
            let ids = pending.live_ids();
            if ids.is_empty() {
                debug!("batch window abandoned before dispatch");
                return;
            }
            if cancel.is_cancelled() {
                pending.resolve(Err(DomainError::Cancelled));
                return;
            }

            metrics::counter!("tenantry_batch_dispatches_total").increment(1);
            metrics::histogram!("tenantry_batch_size").record(ids.len() as f64);
            debug!(batch_size = ids.len(), "dispatching batch");

            let outcome = loader.load(ids, cancel).await;
            if let Err(err) = &outcome {
                metrics::counter!("tenantry_batch_dispatch_failures_total").increment(1);
                warn!(error = %err, "batch dispatch failed");
            }
            pending.resolve(outcome);
        });
    }
}

/// Registers batch resolver metric descriptions.
pub fn register_batch_metrics() {
    metrics::describe_counter!(
        "tenantry_batch_dispatches_total",
        "Batched backend calls issued"
    );
    metrics::describe_counter!(
        "tenantry_batch_dispatch_failures_total",
        "Batched backend calls that failed"
    );
    metrics::describe_histogram!(
        "tenantry_batch_size",
        "Distinct ids carried by one batched backend call"
    );
}
