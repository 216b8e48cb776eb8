//! Tests for the tenant resource cache.
//!
//! Time-sensitive tests run on a paused clock so idle timers advance only
//! when the test says so.

use super::*;
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;

use futures::future::join_all;

// ============================================================
// Test Factory
// ============================================================

#[derive(Debug)]
struct TestBundle {
    key: TenantKey,
    serial: usize,
}

#[derive(Default)]
struct CountingFactory {
    builds: AtomicUsize,
    teardowns: AtomicUsize,
    build_delay: Duration,
    per_key_delay: HashMap<String, Duration>,
    failures_left: AtomicUsize,
}

impl CountingFactory {
    fn with_delay(delay: Duration) -> Self {
        Self {
            build_delay: delay,
            ..Default::default()
        }
    }

    fn failing(times: usize, delay: Duration) -> Self {
        Self {
            build_delay: delay,
            failures_left: AtomicUsize::new(times),
            ..Default::default()
        }
    }

    fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceFactory for CountingFactory {
    type Resource = TestBundle;

    async fn build(&self, key: &TenantKey) -> DomainResult<TestBundle> {
        let serial = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self
            .per_key_delay
            .get(key.as_str())
            .copied()
            .unwrap_or(self.build_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(DomainError::Construction {
                tenant: key.to_string(),
                message: "handshake refused".to_string(),
            });
        }
        Ok(TestBundle {
            key: key.clone(),
            serial,
        })
    }

    async fn teardown(&self, _key: &TenantKey, _resource: &TestBundle) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

const TTL: Duration = Duration::from_millis(1000);

fn cache_with(factory: CountingFactory) -> TenantResourceCache<CountingFactory> {
    TenantResourceCache::new(
        Arc::new(factory),
        CacheConfig::default()
            .with_idle_ttl(TTL)
            .with_sweep_interval(Duration::from_millis(100)),
    )
}

fn key(raw: &str) -> TenantKey {
    TenantKey::new(raw)
}

// ============================================================
// Section 1: Construction
// ============================================================

#[test]
fn test_default_config_uses_one_second_ttl() {
    let config = CacheConfig::default();
    assert_eq!(config.idle_ttl, Duration::from_millis(1000));
    assert!(config.sweep_interval < config.idle_ttl);
}

#[tokio::test]
async fn test_first_acquire_constructs_resource() {
    let cache = cache_with(CountingFactory::default());

    let lease = cache.acquire(&key("tenant-a")).await.unwrap();

    assert_eq!(lease.key, key("tenant-a"));
    assert_eq!(cache.factory().builds(), 1);
    assert!(cache.is_ready(&key("tenant-a")));
}

#[tokio::test]
async fn test_second_acquire_reuses_resource() {
    let cache = cache_with(CountingFactory::default());

    let first = cache.acquire(&key("tenant-a")).await.unwrap();
    let second = cache.acquire(&key("tenant-a")).await.unwrap();

    assert!(Lease::ptr_eq(&first, &second));
    assert_eq!(cache.factory().builds(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_first_touch_constructs_once() {
    let cache = cache_with(CountingFactory::with_delay(Duration::from_millis(50)));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.acquire(&key("tenant-a")).await })
        })
        .collect();

    let leases: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(cache.factory().builds(), 1);
    assert!(leases.iter().all(|lease| Lease::ptr_eq(lease, &leases[0])));
    assert_eq!(cache.stats().active_leases, 32);
}

#[tokio::test]
async fn test_distinct_tenants_get_distinct_resources() {
    let cache = cache_with(CountingFactory::default());

    let a = cache.acquire(&key("tenant-a")).await.unwrap();
    let b = cache.acquire(&key("tenant-b")).await.unwrap();
    let anonymous = cache.acquire(&TenantKey::anonymous()).await.unwrap();

    assert!(!Lease::ptr_eq(&a, &b));
    assert_eq!(b.key, key("tenant-b"));
    assert!(anonymous.key.is_anonymous());
    assert_eq!(cache.factory().builds(), 3);
    assert_eq!(cache.stats().ready, 3);
}

// ============================================================
// Section 2: Construction Failure
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_failed_construction_reaches_every_waiter() {
    let cache = cache_with(CountingFactory::failing(1, Duration::from_millis(20)));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.acquire(&key("tenant-a")).await })
        })
        .collect();

    for joined in join_all(handles).await {
        let err = joined.unwrap().unwrap_err();
        assert!(matches!(err, DomainError::Construction { .. }));
    }
    assert_eq!(cache.factory().builds(), 1);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_failed_construction_does_not_poison_key() {
    let cache = cache_with(CountingFactory::failing(1, Duration::ZERO));

    assert!(cache.acquire(&key("tenant-a")).await.is_err());
    let lease = cache.acquire(&key("tenant-a")).await.unwrap();

    assert_eq!(lease.serial, 2);
    assert_eq!(cache.factory().builds(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_waiter_does_not_cancel_construction() {
    let cache = cache_with(CountingFactory::with_delay(Duration::from_millis(100)));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        cache.acquire(&key("tenant-a")),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(cache.is_ready(&key("tenant-a")));

    let _lease = cache.acquire(&key("tenant-a")).await.unwrap();
    assert_eq!(cache.factory().builds(), 1);
}

// ============================================================
// Section 3: Idle Eviction
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_entry_is_evicted_after_idle_ttl() {
    let cache = cache_with(CountingFactory::default());
    drop(cache.acquire(&key("tenant-a")).await.unwrap());

    tokio::time::advance(Duration::from_millis(500)).await;
    assert_eq!(cache.evict_expired().await, 0);

    tokio::time::advance(Duration::from_millis(600)).await;
    assert_eq!(cache.evict_expired().await, 1);

    assert!(cache.is_empty());
    assert_eq!(cache.factory().teardowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_access_resets_idle_timer() {
    let cache = cache_with(CountingFactory::default());
    drop(cache.acquire(&key("tenant-a")).await.unwrap());

    // Touched just before the TTL elapses.
    tokio::time::advance(Duration::from_millis(900)).await;
    drop(cache.acquire(&key("tenant-a")).await.unwrap());

    tokio::time::advance(Duration::from_millis(200)).await;
    assert_eq!(cache.evict_expired().await, 0);

    tokio::time::advance(Duration::from_millis(900)).await;
    assert_eq!(cache.evict_expired().await, 1);
    assert_eq!(cache.factory().builds(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_leased_entry_is_never_evicted() {
    let cache = cache_with(CountingFactory::default());
    let lease = cache.acquire(&key("tenant-a")).await.unwrap();

    tokio::time::advance(TTL * 5).await;
    assert_eq!(cache.evict_expired().await, 0);
    assert_eq!(cache.factory().teardowns(), 0);

    drop(lease);
    // Releasing counts as activity.
    assert_eq!(cache.evict_expired().await, 0);

    tokio::time::advance(TTL + Duration::from_millis(1)).await;
    assert_eq!(cache.evict_expired().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_lease_touch_extends_lifetime() {
    let cache = cache_with(CountingFactory::default());
    let lease = cache.acquire(&key("tenant-a")).await.unwrap();

    tokio::time::advance(Duration::from_millis(800)).await;
    lease.touch();
    drop(lease);

    tokio::time::advance(Duration::from_millis(800)).await;
    assert_eq!(cache.evict_expired().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_evicted_key_is_rebuilt_on_next_acquire() {
    let cache = cache_with(CountingFactory::default());
    drop(cache.acquire(&key("tenant-a")).await.unwrap());

    tokio::time::advance(TTL * 2).await;
    cache.evict_expired().await;

    let lease = cache.acquire(&key("tenant-a")).await.unwrap();
    assert_eq!(lease.serial, 2);
    assert_eq!(cache.factory().teardowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_background_evictor_removes_idle_entries() {
    let cache = cache_with(CountingFactory::default());
    let evictor = cache.spawn_evictor();

    drop(cache.acquire(&key("tenant-a")).await.unwrap());
    let held = cache.acquire(&key("tenant-b")).await.unwrap();

    tokio::time::sleep(TTL * 2).await;

    assert!(!cache.is_ready(&key("tenant-a")));
    assert!(cache.is_ready(&key("tenant-b")));
    assert_eq!(cache.factory().teardowns(), 1);

    drop(held);
    cache.shutdown(Duration::ZERO).await;
    evictor.await.unwrap();
}

// ============================================================
// Section 4: Isolation and Shutdown
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_slow_tenant_does_not_delay_other_tenants() {
    let mut factory = CountingFactory::with_delay(Duration::from_millis(5));
    factory
        .per_key_delay
        .insert("slow".to_string(), Duration::from_secs(10));
    let cache = cache_with(factory);

    let slow = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.acquire(&key("slow")).await })
    };
    tokio::task::yield_now().await;

    let started = Instant::now();
    let _fast = cache.acquire(&key("fast")).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(50));
    assert!(!slow.is_finished());

    slow.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_tears_down_idle_entries_and_refuses_acquires() {
    let cache = cache_with(CountingFactory::default());
    drop(cache.acquire(&key("tenant-a")).await.unwrap());
    drop(cache.acquire(&key("tenant-b")).await.unwrap());

    assert!(!cache.is_shutting_down());
    let torn_down = cache.shutdown(Duration::from_millis(10)).await;

    assert!(cache.is_shutting_down());
    assert_eq!(torn_down, 2);
    assert_eq!(cache.factory().teardowns(), 2);
    assert!(matches!(
        cache.acquire(&key("tenant-a")).await,
        Err(DomainError::ShuttingDown)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_outstanding_leases() {
    let cache = cache_with(CountingFactory::default());
    let lease = cache.acquire(&key("tenant-a")).await.unwrap();

    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(lease);
    });

    let torn_down = cache.shutdown(Duration::from_secs(1)).await;
    release.await.unwrap();

    assert_eq!(torn_down, 1);
    assert_eq!(cache.factory().teardowns(), 1);
}

#[tokio::test]
async fn test_shutdown_accepts_unbounded_drain_timeout() {
    let cache = cache_with(CountingFactory::default());
    drop(cache.acquire(&key("tenant-a")).await.unwrap());

    let torn_down = cache.shutdown(Duration::from_secs(u64::MAX)).await;

    assert_eq!(torn_down, 1);
    assert_eq!(cache.factory().teardowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_build_finishing_after_shutdown_is_torn_down() {
    let cache = cache_with(CountingFactory::with_delay(Duration::from_millis(200)));

    let waiter = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.acquire(&key("tenant-a")).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.stats().building, 1);

    let torn_down = cache.shutdown(Duration::ZERO).await;
    assert_eq!(torn_down, 0);

    let outcome = waiter.await.unwrap();
    assert_eq!(outcome.unwrap_err(), DomainError::ShuttingDown);
    assert_eq!(cache.factory().builds(), 1);
    assert_eq!(cache.factory().teardowns(), 1);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_every_construction_is_torn_down_exactly_once() {
    let cache = cache_with(CountingFactory::default());

    for round in 0..3 {
        for tenant in ["a", "b", "c"] {
            drop(cache.acquire(&key(tenant)).await.unwrap());
        }
        if round < 2 {
            tokio::time::advance(TTL * 2).await;
            cache.evict_expired().await;
        }
    }
    cache.shutdown(Duration::ZERO).await;

    assert_eq!(cache.factory().builds(), 9);
    assert_eq!(cache.factory().teardowns(), 9);
}

#[tokio::test]
async fn test_stats_report_leases() {
    let cache = cache_with(CountingFactory::default());
    let a1 = cache.acquire(&key("a")).await.unwrap();
    let _a2 = cache.acquire(&key("a")).await.unwrap();
    drop(cache.acquire(&key("b")).await.unwrap());

    assert_eq!(
        cache.stats(),
        CacheStats {
            ready: 2,
            building: 0,
            active_leases: 2,
        }
    );

    drop(a1);
    assert_eq!(cache.stats().active_leases, 1);
}
