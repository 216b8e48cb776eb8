//! Ready cache entries and the leases that borrow them.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// A constructed resource plus its bookkeeping.
///
/// `last_access` is stored as nanoseconds since the owning cache's epoch so
/// it can be refreshed without a lock.
pub(crate) struct ReadyEntry<R> {
    pub(crate) resource: R,
    pub(crate) generation: u64,
    epoch: Instant,
    created_at: Instant,
    last_access: AtomicU64,
    active: AtomicUsize,
}

impl<R> ReadyEntry<R> {
    pub(crate) fn new(resource: R, generation: u64, epoch: Instant) -> Self {
        let entry = Self {
            resource,
            generation,
            epoch,
            created_at: Instant::now(),
            last_access: AtomicU64::new(0),
            active: AtomicUsize::new(0),
        };
        entry.touch();
        entry
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Marks the entry as used now. Never moves the timestamp backwards.
    pub(crate) fn touch(&self) {
        self.last_access
            .fetch_max(self.now_nanos(), Ordering::AcqRel);
    }

    pub(crate) fn idle_for(&self) -> Duration {
        let last = self.last_access.load(Ordering::Acquire);
        Duration::from_nanos(self.now_nanos().saturating_sub(last))
    }

    pub(crate) fn active_leases(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Unused and idle for longer than `ttl`.
    pub(crate) fn is_expired(&self, ttl: Duration) -> bool {
        self.active_leases() == 0 && self.idle_for() > ttl
    }
}

/// Shared borrow of a cached tenant resource.
///
/// While a lease exists its entry cannot be evicted. Dropping the lease
/// refreshes the entry's idle timer.
pub struct Lease<R> {
    entry: Arc<ReadyEntry<R>>,
}

impl<R> Lease<R> {
    /// Takes a lease. Must be called under the entry's shard lock so the
    /// increment cannot race with eviction.
    pub(crate) fn new(entry: Arc<ReadyEntry<R>>) -> Self {
        entry.active.fetch_add(1, Ordering::AcqRel);
        entry.touch();
        Self { entry }
    }

    /// Refreshes the idle timer without releasing the lease.
    pub fn touch(&self) {
        self.entry.touch();
    }

    /// When the underlying resource was constructed.
    pub fn created_at(&self) -> Instant {
        self.entry.created_at
    }

    /// Returns true if both leases borrow the same constructed resource.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.entry, &other.entry)
    }
}

impl<R> Deref for Lease<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.entry.resource
    }
}

impl<R> Drop for Lease<R> {
    fn drop(&mut self) {
        self.entry.touch();
        self.entry.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<R: std::fmt::Debug> std::fmt::Debug for Lease<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("resource", &self.entry.resource)
            .field("generation", &self.entry.generation)
            .field("active_leases", &self.entry.active_leases())
            .finish()
    }
}
