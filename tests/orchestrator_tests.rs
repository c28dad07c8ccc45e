//! Integration Tests for the Orchestrator
//!
//! Cache-aside reads, write-through writes, coalescing, bulk fill and
//! snapshot persistence against the in-memory backing store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cache_aside::cache::{
    CacheEngine, EngineOptions, EventKind, EvictionPolicy, InvalidationPolicy, ManualClock,
};
use cache_aside::orchestrator::{
    BulkFillOptions, CacheAccess, Orchestrator, StopSignal, WriteThrough,
    MAX_BULK_FILL_ITERATIONS,
};
use cache_aside::store::{BackingStore, InMemoryStore, Item, ItemPatch, NewItem};
use cache_aside::CacheError;
use tokio_test::{assert_err, assert_ok};

// == Helper Functions ==

fn item(id: &str, name: &str, size_bytes: u64) -> Item {
    Item {
        id: id.to_string(),
        name: name.to_string(),
        price: 10.0,
        category: "Test".to_string(),
        stock: 5,
        size_bytes,
    }
}

fn new_item(name: &str, size_bytes: Option<u64>) -> NewItem {
    NewItem {
        name: name.to_string(),
        price: 25.0,
        category: "Misc".to_string(),
        stock: 3,
        size_bytes,
    }
}

async fn orchestrator_with(
    capacity: u64,
    options: EngineOptions,
    store: Arc<InMemoryStore>,
) -> (Orchestrator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let engine = CacheEngine::with_clock(capacity, options, clock.clone()).unwrap();
    let orchestrator = Orchestrator::connect(engine, store).await.unwrap();
    (orchestrator, clock)
}

async fn catalog_orchestrator_from(store: Arc<InMemoryStore>) -> (Orchestrator, Arc<ManualClock>) {
    orchestrator_with(8192, EngineOptions::default(), store).await
}

async fn catalog_orchestrator(capacity: u64) -> (Orchestrator, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::with_catalog());
    let (orchestrator, _) =
        orchestrator_with(capacity, EngineOptions::default(), store.clone()).await;
    (orchestrator, store)
}

fn cached_keys(entries: &[cache_aside::cache::CacheEntry<Item>]) -> Vec<&str> {
    entries.iter().map(|e| e.key.as_str()).collect()
}

// == Cache-Aside Reads ==

#[tokio::test]
async fn test_miss_then_hit() {
    let (orchestrator, store) = catalog_orchestrator(8192).await;

    let first = assert_ok!(orchestrator.get("p3").await);
    assert_eq!(first.access, CacheAccess::Miss);
    assert!(!first.coalesced);
    assert_eq!(first.item.as_ref().map(|i| i.size_bytes), Some(1024));

    let second = assert_ok!(orchestrator.get("p3").await);
    assert_eq!(second.access, CacheAccess::Hit);
    assert_eq!(second.item, first.item);
    assert_eq!(store.fetch_count(), 1);

    let metrics = orchestrator.metrics().await;
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.total_requests, 2);
    assert!((metrics.hit_rate - 0.5).abs() < 1e-9);

    let events = orchestrator.events().await;
    assert_eq!(events[0].kind, EventKind::Hit);
    assert_eq!(events[1].kind, EventKind::Miss);
    assert_eq!(events[1].label, "Sony WH-1000XM5");
}

#[tokio::test]
async fn test_lru_eviction_is_deterministic() {
    let store = Arc::new(InMemoryStore::with_items(vec![
        item("p1", "One", 1024),
        item("p2", "Two", 1024),
        item("p3", "Three", 1024),
    ]));
    let (orchestrator, clock) =
        orchestrator_with(2048, EngineOptions::default(), store).await;

    for id in ["p1", "p2", "p3"] {
        clock.advance(Duration::from_millis(10));
        assert_ok!(orchestrator.get(id).await);
    }

    let cached = orchestrator.cached_items().await;
    assert_eq!(cached_keys(&cached), vec!["p2", "p3"]);

    let usage = orchestrator.memory_usage().await;
    assert_eq!(usage.used_bytes, 2048);
    assert_eq!(usage.item_count, 2);

    let metrics = orchestrator.metrics().await;
    assert_eq!(metrics.evictions, 1);

    // the miss for p3 sits directly above the eviction it caused
    let events = orchestrator.events().await;
    assert_eq!(events[0].kind, EventKind::Miss);
    assert_eq!(events[0].key, "p3");
    assert_eq!(events[1].kind, EventKind::Eviction);
    assert_eq!(events[1].key, "p1");
    assert_eq!(events[1].label, "One");
}

#[tokio::test]
async fn test_unknown_id_counts_a_miss() {
    let (orchestrator, _) = catalog_orchestrator(8192).await;

    let lookup = assert_ok!(orchestrator.get("ghost").await);
    assert!(lookup.item.is_none());
    assert_eq!(lookup.access, CacheAccess::Miss);

    let metrics = orchestrator.metrics().await;
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.evictions, 0);
    assert!(orchestrator.cached_items().await.is_empty());
}

#[tokio::test]
async fn test_backing_read_failure_propagates() {
    let (orchestrator, store) = catalog_orchestrator(8192).await;
    store.fail_reads(true);

    let err = assert_err!(orchestrator.get("p1").await);
    assert!(matches!(err, CacheError::Backing(_)));
    assert_eq!(orchestrator.metrics().await.total_requests, 0);
    assert!(!orchestrator.is_loading("p1"));

    store.fail_reads(false);
    let lookup = assert_ok!(orchestrator.get("p1").await);
    assert!(lookup.item.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_gets_share_one_fetch() {
    let store = Arc::new(InMemoryStore::with_catalog().with_latency(Duration::from_millis(100)));
    let (orchestrator, _) =
        orchestrator_with(8192, EngineOptions::default(), store.clone()).await;

    let (leader, follower) = tokio::join!(orchestrator.get("p2"), orchestrator.get("p2"));
    let leader = assert_ok!(leader);
    let follower = assert_ok!(follower);

    assert!(!leader.coalesced);
    assert!(follower.coalesced);
    assert_eq!(leader.item, follower.item);
    assert_eq!(store.fetch_count(), 1);

    let metrics = orchestrator.metrics().await;
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(orchestrator.memory_usage().await.used_bytes, 1536);
    assert!(orchestrator.loading_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fetch_completes_after_leading_caller_is_cancelled() {
    let store = Arc::new(InMemoryStore::with_catalog().with_latency(Duration::from_millis(200)));
    let (orchestrator, _) =
        orchestrator_with(8192, EngineOptions::default(), store.clone()).await;
    let orchestrator = Arc::new(orchestrator);

    let leader = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.get("p1").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(orchestrator.is_loading("p1"));

    let follower = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.get("p1").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    leader.abort();

    let lookup = assert_ok!(follower.await.unwrap());
    assert!(lookup.coalesced);
    assert_eq!(lookup.item.map(|i| i.id), Some("p1".to_string()));

    let entries = orchestrator.cached_items().await;
    assert_eq!(cached_keys(&entries), vec!["p1"]);
    assert_eq!(store.fetch_count(), 1);
    assert!(!orchestrator.is_loading("p1"));
    assert_eq!(orchestrator.metrics().await.misses, 1);
}

#[tokio::test]
async fn test_miss_fill_counts_as_first_access() {
    let store = Arc::new(InMemoryStore::with_items(vec![
        item("a", "Alpha", 1024),
        item("b", "Beta", 1024),
    ]));
    let options = EngineOptions {
        eviction: EvictionPolicy::Lfu,
        ..EngineOptions::default()
    };
    let (orchestrator, _) = orchestrator_with(2048, options, store).await;

    assert_ok!(orchestrator.get("a").await);
    let created = assert_ok!(orchestrator.put(new_item("Gamma", Some(1024))).await);

    let entries = orchestrator.cached_items().await;
    assert_eq!(entries[0].access_count, 1);
    assert_eq!(entries[1].access_count, 0);

    // the never-read item loses the frequency tie-break
    assert_ok!(orchestrator.get("b").await);
    let entries = orchestrator.cached_items().await;
    assert_eq!(cached_keys(&entries), vec!["a", "b"]);
    assert!(entries.iter().all(|e| e.key != created.id));
}

#[tokio::test]
async fn test_event_invalidation_refetches_stale_entries() {
    let stale = Arc::new(AtomicBool::new(false));
    let flag = stale.clone();
    let options = EngineOptions {
        invalidation: InvalidationPolicy::event(move |key| {
            key == "p1" && flag.load(Ordering::SeqCst)
        }),
        ..EngineOptions::default()
    };
    let store = Arc::new(InMemoryStore::with_catalog());
    let (orchestrator, _) = orchestrator_with(8192, options, store.clone()).await;

    assert_ok!(orchestrator.get("p1").await);
    stale.store(true, Ordering::SeqCst);

    let lookup = assert_ok!(orchestrator.get("p1").await);
    assert_eq!(lookup.access, CacheAccess::Miss);
    assert_eq!(store.fetch_count(), 2);

    let metrics = orchestrator.metrics().await;
    assert_eq!(metrics.misses, 2);
    assert_eq!(metrics.expirations, 1);

    let kinds: Vec<EventKind> = orchestrator.events().await.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Miss, EventKind::Expired, EventKind::Miss]);
}

#[tokio::test]
async fn test_ttl_expiry_through_orchestrator() {
    let options = EngineOptions {
        invalidation: InvalidationPolicy::Ttl {
            default_ttl: Some(Duration::from_secs(1)),
        },
        ..EngineOptions::default()
    };
    let store = Arc::new(InMemoryStore::with_catalog());
    let (orchestrator, clock) = orchestrator_with(8192, options, store.clone()).await;

    assert_ok!(orchestrator.get("p5").await);
    clock.advance(Duration::from_millis(1100));

    let lookup = assert_ok!(orchestrator.get("p5").await);
    assert_eq!(lookup.access, CacheAccess::Miss);
    assert_eq!(store.fetch_count(), 2);
    assert_eq!(orchestrator.metrics().await.expirations, 1);
}

// == Write-Through ==

#[tokio::test]
async fn test_put_writes_through_and_caches() {
    let (orchestrator, store) = catalog_orchestrator(8192).await;

    let created = assert_ok!(orchestrator.put(new_item("Kindle", Some(700))).await);
    assert_eq!(created.id, "p11");
    assert_eq!(created.size_bytes, 700);

    let stored = assert_ok!(store.get_by_id("p11").await);
    assert_eq!(stored, Some(created.clone()));

    let cached = orchestrator.cached_items().await;
    assert_eq!(cached_keys(&cached), vec!["p11"]);

    let available = orchestrator.available_items().await;
    assert_eq!(available.len(), 11);
    assert_eq!(available[10].name, "Kindle");

    let events = orchestrator.events().await;
    assert_eq!(events[0].kind, EventKind::Add);
    assert_eq!(events[0].label, "Kindle");
}

#[tokio::test]
async fn test_put_picks_a_size_when_missing() {
    let (orchestrator, _) = catalog_orchestrator(8192).await;

    let created = assert_ok!(orchestrator.put(new_item("Sizeless", None)).await);
    assert!((512..=1536).contains(&created.size_bytes));
    assert_eq!(
        orchestrator.memory_usage().await.used_bytes,
        created.size_bytes
    );
}

#[tokio::test]
async fn test_put_too_large_leaves_store_untouched() {
    let (orchestrator, store) = catalog_orchestrator(1024).await;

    let err = assert_err!(orchestrator.put(new_item("Huge", Some(4096))).await);
    assert!(matches!(
        err,
        CacheError::ItemTooLarge {
            size: 4096,
            capacity: 1024
        }
    ));
    assert_eq!(assert_ok!(store.list_all().await).len(), 10);
    assert!(orchestrator.events().await.is_empty());
}

#[tokio::test]
async fn test_put_failure_propagates() {
    let (orchestrator, store) = catalog_orchestrator(8192).await;
    store.fail_writes(true);

    let err = assert_err!(orchestrator.put(new_item("Kindle", Some(700))).await);
    assert!(matches!(err, CacheError::Backing(_)));
    assert!(orchestrator.cached_items().await.is_empty());
    assert_eq!(orchestrator.available_items().await.len(), 10);
}

#[tokio::test]
async fn test_update_cached_item_commits() {
    let (orchestrator, store) = catalog_orchestrator(8192).await;
    assert_ok!(orchestrator.get("p4").await);

    let patch = ItemPatch {
        stock: Some(7),
        ..ItemPatch::default()
    };
    let outcome = assert_ok!(orchestrator.update("p4", patch).await).unwrap();

    assert_eq!(outcome.write_through, WriteThrough::Committed);
    assert!(outcome.cached);
    assert_eq!(outcome.item.stock, 7);

    let stored = assert_ok!(store.get_by_id("p4").await).unwrap();
    assert_eq!(stored.stock, 7);

    let hit = assert_ok!(orchestrator.get("p4").await);
    assert_eq!(hit.access, CacheAccess::Hit);
    assert_eq!(hit.item.map(|i| i.stock), Some(7));

    let kinds: Vec<EventKind> = orchestrator.events().await.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Hit, EventKind::Update, EventKind::Miss]);
}

#[tokio::test]
async fn test_update_uncached_item_writes_through_only() {
    let (orchestrator, store) = catalog_orchestrator(8192).await;

    let patch = ItemPatch {
        price: Some(199.0),
        ..ItemPatch::default()
    };
    let outcome = assert_ok!(orchestrator.update("p8", patch).await).unwrap();

    assert!(!outcome.cached);
    assert_eq!(outcome.write_through, WriteThrough::Committed);
    assert_eq!(assert_ok!(store.get_by_id("p8").await).unwrap().price, 199.0);
    assert!(orchestrator.cached_items().await.is_empty());
    assert!(orchestrator.events().await.is_empty());
}

#[tokio::test]
async fn test_update_degrades_when_store_write_fails() {
    let (orchestrator, store) = catalog_orchestrator(8192).await;
    assert_ok!(orchestrator.get("p1").await);
    store.fail_writes(true);

    let patch = ItemPatch {
        name: Some("MacBook Pro 14\"".to_string()),
        ..ItemPatch::default()
    };
    let outcome = assert_ok!(orchestrator.update("p1", patch).await).unwrap();

    assert!(matches!(outcome.write_through, WriteThrough::Degraded { .. }));
    assert_eq!(outcome.item.name, "MacBook Pro 14\"");

    let stored = assert_ok!(store.get_by_id("p1").await).unwrap();
    assert_eq!(stored.name, "MacBook Pro 16\"");

    // nothing cached to fall back on
    let patch = ItemPatch {
        stock: Some(1),
        ..ItemPatch::default()
    };
    let err = assert_err!(orchestrator.update("p2", patch).await);
    assert!(matches!(err, CacheError::Backing(_)));
}

#[tokio::test]
async fn test_update_unknown_id() {
    let (orchestrator, _) = catalog_orchestrator(8192).await;

    let patch = ItemPatch {
        stock: Some(1),
        ..ItemPatch::default()
    };
    assert!(assert_ok!(orchestrator.update("ghost", patch).await).is_none());
}

// == Delete / Clear / Reset ==

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (orchestrator, _) = catalog_orchestrator(8192).await;
    assert_ok!(orchestrator.get("p1").await);
    assert_ok!(orchestrator.get("p2").await);

    assert!(orchestrator.delete("p1").await);
    let usage_once = orchestrator.memory_usage().await;
    let cached_once = orchestrator.cached_items().await;

    assert!(!orchestrator.delete("p1").await);
    assert_eq!(orchestrator.memory_usage().await, usage_once);
    assert_eq!(orchestrator.cached_items().await, cached_once);

    let deletes = orchestrator
        .events()
        .await
        .iter()
        .filter(|e| e.kind == EventKind::Delete)
        .count();
    assert_eq!(deletes, 1);
}

#[tokio::test]
async fn test_clear_then_get_is_a_fresh_miss() {
    let (orchestrator, store) = catalog_orchestrator(8192).await;
    assert_ok!(orchestrator.get("p1").await);
    assert_ok!(orchestrator.get("p1").await);

    assert_ok!(orchestrator.clear().await);
    assert!(orchestrator.cached_items().await.is_empty());
    assert!(orchestrator.events().await.is_empty());
    assert_eq!(orchestrator.metrics().await.total_requests, 0);
    assert_eq!(orchestrator.available_items().await.len(), 10);

    let lookup = assert_ok!(orchestrator.get("p1").await);
    assert_eq!(lookup.access, CacheAccess::Miss);
    assert_eq!(store.fetch_count(), 2);
    assert_eq!(orchestrator.metrics().await.misses, 1);
}

#[tokio::test]
async fn test_reset_metrics_keeps_entries_and_events() {
    let (orchestrator, _) = catalog_orchestrator(8192).await;
    assert_ok!(orchestrator.get("p1").await);
    assert_ok!(orchestrator.get("p1").await);

    orchestrator.reset_metrics().await;

    let metrics = orchestrator.metrics().await;
    assert_eq!(metrics.total_requests, 0);
    assert_eq!(metrics.hit_rate, 0.0);
    assert_eq!(metrics.miss_rate, 0.0);
    assert_eq!(orchestrator.cached_items().await.len(), 1);
    assert_eq!(orchestrator.events().await.len(), 2);
}

// == Bulk Fill ==

#[tokio::test]
async fn test_bulk_fill_terminates_under_capacity() {
    let (orchestrator, _) = catalog_orchestrator(1_048_576).await;
    let options = BulkFillOptions {
        seed: Some(7),
        ..BulkFillOptions::default()
    };

    let report = assert_ok!(orchestrator.bulk_fill(&options, &StopSignal::new()).await);

    assert_eq!(report.iterations, options.max_iterations);
    assert!(!report.stopped);
    assert!(report.evictions > 0);
    assert!(report.current_bytes <= 1_048_576);

    let usage = orchestrator.memory_usage().await;
    assert_eq!(usage.used_bytes, report.current_bytes);
    assert_eq!(orchestrator.metrics().await.evictions, report.evictions);
    assert_eq!(orchestrator.events().await.len(), 50);
}

#[tokio::test]
async fn test_bulk_fill_honors_stop_signal() {
    let (orchestrator, _) = catalog_orchestrator(1_048_576).await;
    let stop = StopSignal::new();
    stop.stop();

    let report = assert_ok!(
        orchestrator
            .bulk_fill(&BulkFillOptions::default(), &stop)
            .await
    );

    assert!(report.stopped);
    assert_eq!(report.iterations, 0);
    assert_eq!(report.current_bytes, 0);
}

#[tokio::test]
async fn test_bulk_fill_stops_mid_run() {
    let (orchestrator, _) = catalog_orchestrator(1_048_576).await;
    let orchestrator = Arc::new(orchestrator);
    let stop = StopSignal::new();
    let options = BulkFillOptions {
        max_iterations: 1_000_000,
        ..BulkFillOptions::default()
    };

    let fill = {
        let orchestrator = orchestrator.clone();
        let stop = stop.clone();
        tokio::spawn(async move { orchestrator.bulk_fill(&options, &stop).await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    stop.stop();

    let report = fill.await.unwrap().unwrap();
    assert!(report.stopped);
    assert!(report.iterations < 1_000_000);
    assert!(report.current_bytes <= 1_048_576);
}

#[tokio::test]
async fn test_bulk_fill_caps_requested_iterations() {
    let (orchestrator, _) = catalog_orchestrator(16 * 1024).await;
    let options = BulkFillOptions {
        max_iterations: u64::MAX,
        seed: Some(9),
        ..BulkFillOptions::default()
    };

    let report = assert_ok!(orchestrator.bulk_fill(&options, &StopSignal::new()).await);

    assert_eq!(report.iterations, MAX_BULK_FILL_ITERATIONS);
    assert!(!report.stopped);
    assert!(report.current_bytes <= 16 * 1024);
}

#[tokio::test]
async fn test_bulk_fill_rejects_bad_ranges() {
    let (orchestrator, _) = catalog_orchestrator(1024).await;

    let inverted = BulkFillOptions {
        min_size: 900,
        max_size: 100,
        ..BulkFillOptions::default()
    };
    assert!(matches!(
        orchestrator.bulk_fill(&inverted, &StopSignal::new()).await,
        Err(CacheError::InvalidRequest(_))
    ));

    assert!(matches!(
        orchestrator
            .bulk_fill(&BulkFillOptions::default(), &StopSignal::new())
            .await,
        Err(CacheError::ItemTooLarge { .. })
    ));
}

#[tokio::test]
async fn test_bulk_fill_under_every_policy() {
    for policy in [
        EvictionPolicy::Lru,
        EvictionPolicy::Lfu,
        EvictionPolicy::Fifo,
        EvictionPolicy::Random,
    ] {
        let options = EngineOptions {
            eviction: policy,
            seed: Some(11),
            ..EngineOptions::default()
        };
        let store = Arc::new(InMemoryStore::with_catalog());
        let (orchestrator, _) = orchestrator_with(32 * 1024, options, store).await;
        let fill = BulkFillOptions {
            max_iterations: 200,
            seed: Some(3),
            ..BulkFillOptions::default()
        };

        let report = assert_ok!(orchestrator.bulk_fill(&fill, &StopSignal::new()).await);
        assert!(report.evictions > 0, "{} never evicted", policy);
        assert!(report.current_bytes <= 32 * 1024);
    }
}

// == Snapshot ==

#[tokio::test]
async fn test_snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");

    let (orchestrator, _) = catalog_orchestrator(8192).await;
    assert_ok!(orchestrator.get("p1").await);
    assert_ok!(orchestrator.get("p2").await);
    assert_ok!(orchestrator.get("p1").await);
    assert_ok!(orchestrator.save_to(&path).await);

    let fresh_store = Arc::new(InMemoryStore::with_catalog());
    let (restored, _) = catalog_orchestrator_from(fresh_store.clone()).await;
    let count = assert_ok!(restored.load_from(&path).await);

    assert_eq!(count, 2);
    assert_eq!(restored.memory_usage().await.used_bytes, 2048 + 1536);
    assert_eq!(restored.metrics().await, orchestrator.metrics().await);
    assert_eq!(restored.events().await, orchestrator.events().await);
    assert_eq!(restored.cached_items().await, orchestrator.cached_items().await);

    let lookup = assert_ok!(restored.get("p2").await);
    assert_eq!(lookup.access, CacheAccess::Hit);
    assert_eq!(fresh_store.fetch_count(), 0);
}

#[tokio::test]
async fn test_snapshot_recomputes_bytes_into_smaller_cache() {
    let (orchestrator, _) = catalog_orchestrator(8192).await;
    for id in ["p1", "p2", "p3"] {
        assert_ok!(orchestrator.get(id).await);
    }
    let snapshot = orchestrator.snapshot().await;

    let store = Arc::new(InMemoryStore::with_catalog());
    let (small, _) = orchestrator_with(3000, EngineOptions::default(), store).await;
    small.restore(snapshot).await;

    let usage = small.memory_usage().await;
    let sum: u64 = small
        .cached_items()
        .await
        .iter()
        .map(|e| e.size_bytes)
        .sum();
    assert_eq!(usage.used_bytes, sum);
    assert!(usage.used_bytes <= 3000);
}

#[tokio::test]
async fn test_load_missing_snapshot_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, _) = catalog_orchestrator(8192).await;

    let err = assert_err!(orchestrator.load_from(dir.path().join("absent.json")).await);
    assert!(matches!(err, CacheError::Persistence(_)));
}
