//! Tenant-keyed resource cache with idle eviction.
//!
//! One entry per [`TenantKey`], holding either a construction in progress or
//! a ready resource. Callers borrow the resource through a [`Lease`]; an
//! entry is evicted only when no lease is outstanding and it has been idle
//! for longer than the configured time-to-live.
//!
//! # Architecture
//!
//! Entries live in a `DashMap`, so acquire and eviction for one key are
//! serialized by that key's shard lock while unrelated tenants proceed on
//! other shards. The shard lock is never held across an await point.
//!
//! ```text
//!  acquire(key) ──► Vacant ──► insert Building ──► spawn build task
//!        │                          │                    │
//!        │                     Occupied(Building) ◄──────┤ publish Ready / remove on error
//!        │                          │ wait on watch      │
//!        └──► Occupied(Ready) ──► Lease (refcount += 1)  ▼
//!                                                  evictor: Ready && idle && refcount == 0
//! ```
//!
//! Construction runs on its own task, so a waiter that gives up never
//! cancels it; other waiters and later acquires still get the result.
//!
//! # Example
//!
//! ```rust,ignore
//! let cache = TenantResourceCache::new(Arc::new(factory), CacheConfig::default());
//! let _evictor = cache.spawn_evictor();
//!
//! let bundle = cache.acquire(&TenantKey::new("token")).await?;
//! bundle.do_work().await;
//! drop(bundle); // releases the lease and refreshes the idle timer
//! ```

mod lease;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::TenantKey;
use crate::error::{DomainError, DomainResult};

pub use lease::Lease;
use lease::ReadyEntry;

/// Configuration for the tenant resource cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long an unused entry is kept after its last activity.
    pub idle_ttl: Duration,
    /// How often the background evictor scans for idle entries.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_millis(1000),
            sweep_interval: Duration::from_millis(250),
        }
    }
}

impl CacheConfig {
    /// Sets the idle time-to-live.
    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    /// Sets the evictor scan interval.
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }
}

/// Builds and tears down the resource cached for one tenant.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// The cached resource.
    type Resource: Send + Sync + 'static;

    /// Constructs the resource for `key`.
    ///
    /// Called at most once concurrently per key. An error is delivered to
    /// every caller waiting on this construction.
    async fn build(&self, key: &TenantKey) -> DomainResult<Self::Resource>;

    /// Releases the resource after eviction.
    ///
    /// Called exactly once for every successful `build`.
    async fn teardown(&self, _key: &TenantKey, _resource: &Self::Resource) {}
}

/// Drain deadline used when `now + drain_timeout` overflows (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries with a constructed resource.
    pub ready: usize,
    /// Entries whose construction is still running.
    pub building: usize,
    /// Outstanding leases across all ready entries.
    pub active_leases: usize,
}

type BuildOutcome = Option<DomainResult<()>>;

enum Slot<R> {
    Building {
        generation: u64,
        done: watch::Receiver<BuildOutcome>,
    },
    Ready(Arc<ReadyEntry<R>>),
}

impl<R> Slot<R> {
    fn generation(&self) -> u64 {
        match self {
            Slot::Building { generation, .. } => *generation,
            Slot::Ready(ready) => ready.generation,
        }
    }
}

struct Inner<F: ResourceFactory> {
    factory: Arc<F>,
    config: CacheConfig,
    entries: DashMap<TenantKey, Slot<F::Resource>>,
    epoch: Instant,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

/// Keyed registry of tenant resources.
///
/// Cloning is cheap; clones share the same entries.
pub struct TenantResourceCache<F: ResourceFactory> {
    inner: Arc<Inner<F>>,
}

impl<F: ResourceFactory> Clone for TenantResourceCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFactory> std::fmt::Debug for TenantResourceCache<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantResourceCache")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<F: ResourceFactory> TenantResourceCache<F> {
    /// Creates an empty cache. Call [`spawn_evictor`](Self::spawn_evictor)
    /// to start background eviction.
    pub fn new(factory: Arc<F>, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                config,
                entries: DashMap::new(),
                epoch: Instant::now(),
                next_generation: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Returns the configuration for this cache.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns the factory used to build entries.
    pub fn factory(&self) -> &Arc<F> {
        &self.inner.factory
    }

    /// Returns the resource for `key`, constructing it if absent.
    ///
    /// Concurrent callers for an absent key join a single construction.
    /// A failed construction is reported to all of them and leaves the key
    /// absent, so the next acquire starts over.
    pub async fn acquire(&self, key: &TenantKey) -> DomainResult<Lease<F::Resource>> {
        loop {
            if self.inner.shutdown.is_cancelled() {
                return Err(DomainError::ShuttingDown);
            }

            let mut done = match self.inner.entries.entry(key.clone()) {
                Entry::Occupied(occupied) => match occupied.get() {
                    Slot::Ready(ready) => {
                        metrics::counter!("tenantry_cache_hits_total").increment(1);
                        return Ok(Lease::new(Arc::clone(ready)));
                    }
                    Slot::Building { done, .. } => done.clone(),
                },
                Entry::Vacant(vacant) => {
                    metrics::counter!("tenantry_cache_misses_total").increment(1);
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = watch::channel(None);
                    vacant.insert(Slot::Building {
                        generation,
                        done: rx.clone(),
                    });
                    self.spawn_construction(key.clone(), generation, tx);
                    rx
                }
            };

            let outcome = match done.wait_for(Option::is_some).await {
                Ok(outcome) => outcome.clone(),
                Err(_) => None,
            };

            match outcome {
                // Published; loop to take the lease under the shard lock.
                Some(Ok(())) => continue,
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(DomainError::Construction {
                        tenant: key.to_string(),
                        message: "construction task aborted".to_string(),
                    })
                }
            }
        }
    }

    fn spawn_construction(
        &self,
        key: TenantKey,
        generation: u64,
        done: watch::Sender<BuildOutcome>,
    ) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let guard = ConstructionGuard::new(&inner, &key, generation);

            match inner.factory.build(&key).await {
                Ok(resource) => {
                    let ready = Arc::new(ReadyEntry::new(resource, generation, inner.epoch));
                    let published = match inner.entries.get_mut(&key) {
                        Some(mut slot) if slot.generation() == generation => {
                            *slot = Slot::Ready(Arc::clone(&ready));
                            true
                        }
                        _ => false,
                    };
                    guard.complete();

                    if published {
                        metrics::counter!("tenantry_bundle_constructions_total").increment(1);
                        debug!(tenant = %key, generation, "tenant resource published");
                        done.send_replace(Some(Ok(())));
                    } else {
                        // Placeholder was dropped by shutdown while we were building.
                        inner.factory.teardown(&key, &ready.resource).await;
                        done.send_replace(Some(Err(DomainError::ShuttingDown)));
                    }
                }
                Err(err) => {
                    inner
                        .entries
                        .remove_if(&key, |_, slot| slot.generation() == generation);
                    guard.complete();

                    metrics::counter!("tenantry_bundle_construction_failures_total").increment(1);
                    warn!(tenant = %key, error = %err, "tenant resource construction failed");
                    done.send_replace(Some(Err(err)));
                }
            }
        });
    }

    /// Removes and tears down every entry that is unused and idle past the
    /// time-to-live. Returns the number of evicted entries.
    pub async fn evict_expired(&self) -> usize {
        let ttl = self.inner.config.idle_ttl;
        let candidates: Vec<TenantKey> = self
            .inner
            .entries
            .iter()
            .filter_map(|entry| match entry.value() {
                Slot::Ready(ready) if ready.is_expired(ttl) => Some(entry.key().clone()),
                _ => None,
            })
            .collect();

        let mut evicted = 0;
        for key in candidates {
            // Re-check under the shard lock; an acquire may have raced in.
            let removed = self.inner.entries.remove_if(&key, |_, slot| {
                matches!(slot, Slot::Ready(ready) if ready.is_expired(ttl))
            });
            if let Some((key, Slot::Ready(ready))) = removed {
                self.teardown(&key, &ready).await;
                evicted += 1;
            }
        }
        evicted
    }

    /// Spawns the background evictor, which runs until
    /// [`shutdown`](Self::shutdown) is called.
    pub fn spawn_evictor(&self) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.inner.config.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cache.inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = cache.evict_expired().await;
                        if evicted > 0 {
                            debug!(evicted, "evicted idle tenant resources");
                        }
                    }
                }
            }
            debug!("tenant resource evictor stopped");
        })
    }

    /// Stops the evictor, refuses new acquires and tears down every entry.
    ///
    /// Entries with outstanding leases are waited for up to `drain_timeout`
    /// and left in place if still in use afterwards. Returns the number of
    /// resources torn down.
    pub async fn shutdown(&self, drain_timeout: Duration) -> usize {
        self.inner.shutdown.cancel();
        let now = Instant::now();
        // Saturate: an unrepresentable deadline means wait for every lease.
        let deadline = now
            .checked_add(drain_timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let mut torn_down = 0;

        loop {
            let keys: Vec<TenantKey> = self
                .inner
                .entries
                .iter()
                .map(|entry| entry.key().clone())
                .collect();

            for key in keys {
                let removed = self.inner.entries.remove_if(&key, |_, slot| match slot {
                    Slot::Ready(ready) => ready.active_leases() == 0,
                    Slot::Building { .. } => true,
                });
                if let Some((key, Slot::Ready(ready))) = removed {
                    self.teardown(&key, &ready).await;
                    torn_down += 1;
                }
            }

            if self.inner.entries.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    remaining = self.inner.entries.len(),
                    "tenant resources still in use at shutdown"
                );
                break;
            }
            tokio::time::sleep(self.inner.config.sweep_interval.min(drain_timeout)).await;
        }

        torn_down
    }

    async fn teardown(&self, key: &TenantKey, ready: &ReadyEntry<F::Resource>) {
        self.inner.factory.teardown(key, &ready.resource).await;
        metrics::counter!("tenantry_bundle_evictions_total").increment(1);
        debug!(tenant = %key, generation = ready.generation, "tenant resource evicted");
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Returns true if a constructed resource is cached for `key`.
    pub fn is_ready(&self, key: &TenantKey) -> bool {
        self.inner
            .entries
            .get(key)
            .is_some_and(|slot| matches!(slot.value(), Slot::Ready(_)))
    }

    /// Returns the number of entries, including constructions in progress.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Returns a snapshot of the cache occupancy.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.inner.entries.iter() {
            match entry.value() {
                Slot::Ready(ready) => {
                    stats.ready += 1;
                    stats.active_leases += ready.active_leases();
                }
                Slot::Building { .. } => stats.building += 1,
            }
        }
        stats
    }
}

/// Removes the placeholder if the construction task ends without
/// publishing (for example when the factory panics).
struct ConstructionGuard<'a, F: ResourceFactory> {
    inner: &'a Inner<F>,
    key: &'a TenantKey,
    generation: u64,
    completed: bool,
}

impl<'a, F: ResourceFactory> ConstructionGuard<'a, F> {
    fn new(inner: &'a Inner<F>, key: &'a TenantKey, generation: u64) -> Self {
        Self {
            inner,
            key,
            generation,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl<F: ResourceFactory> Drop for ConstructionGuard<'_, F> {
    fn drop(&mut self) {
        if !self.completed {
            let generation = self.generation;
            self.inner
                .entries
                .remove_if(self.key, |_, slot| slot.generation() == generation);
        }
    }
}

/// Registers tenant cache metric descriptions.
///
/// Optional; gives the Prometheus exposition readable help texts.
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "tenantry_cache_hits_total",
        "Acquires served by an already constructed tenant resource"
    );
    metrics::describe_counter!(
        "tenantry_cache_misses_total",
        "Acquires that started a tenant resource construction"
    );
    metrics::describe_counter!(
        "tenantry_bundle_constructions_total",
        "Tenant resources successfully constructed"
    );
    metrics::describe_counter!(
        "tenantry_bundle_construction_failures_total",
        "Tenant resource constructions that failed"
    );
    metrics::describe_counter!(
        "tenantry_bundle_evictions_total",
        "Tenant resources torn down after eviction or shutdown"
    );
}
