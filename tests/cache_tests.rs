//! Tests for the cache store: capacity eviction, TTL, statistics,
//! invalidation, durable warm restart and the background sweep.

use std::sync::Arc;
use std::time::Duration;

use devpath_engine::cache::*;
use devpath_engine::clock::{Clock, ManualClock};
use devpath_engine::config::CacheConfig;
use proptest::prelude::*;
use serde_json::json;

fn store_with(clock: Arc<ManualClock>) -> CacheStore {
    CacheStore::new(CacheConfig::default(), clock)
}

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

#[test]
fn test_sixty_inserts_settle_within_capacity() {
    let clock = ManualClock::shared(0);
    let store = store_with(clock.clone());
    for i in 0..60 {
        clock.advance(Duration::from_millis(1));
        store.set(format!("entry:{i}"), json!(i));
    }
    let stats = store.statistics();
    assert!(stats.size <= 50, "size {}", stats.size);
    assert!(stats.evictions >= 10, "evictions {}", stats.evictions);
    assert!(store.contains("entry:59"), "newest entry survives");
}

#[test]
fn test_eviction_prefers_least_recently_accessed() {
    let clock = ManualClock::shared(0);
    let config = CacheConfig { capacity: 4, ..Default::default() };
    let store = CacheStore::new(config, clock.clone());
    for k in ["a", "b", "c", "d"] {
        clock.advance(Duration::from_millis(1));
        store.set(k, json!(k));
    }
    clock.advance(Duration::from_millis(1));
    assert!(store.get("a").is_some());

    clock.advance(Duration::from_millis(1));
    store.set("e", json!("e"));
    assert!(store.contains("a"), "recently read entry kept");
    assert!(!store.contains("b"), "oldest untouched entry evicted");
}

// ---------------------------------------------------------------------------
// TTL
// ---------------------------------------------------------------------------

#[test]
fn test_zero_ttl_is_immediately_absent() {
    let store = store_with(ManualClock::shared(0));
    store.set_with_ttl("k", json!(1), Duration::ZERO);
    assert!(store.get("k").is_none());
    assert_eq!(store.statistics().misses, 1);
}

#[test]
fn test_expired_entry_is_removed_on_get() {
    let clock = ManualClock::shared(0);
    let store = store_with(clock.clone());
    store.set_with_ttl("k", json!(1), Duration::from_secs(5));
    clock.advance(Duration::from_secs(5));
    assert!(store.get("k").is_none());
    assert_eq!(store.len(), 0);
}

proptest! {
    #[test]
    fn prop_entry_readable_iff_younger_than_ttl(
        ttl_ms in 0u64..10_000,
        elapsed_ms in 0u64..20_000,
    ) {
        let clock = ManualClock::shared(1_000);
        let store = store_with(clock.clone());
        store.set_with_ttl("k", json!("v"), Duration::from_millis(ttl_ms));
        clock.advance(Duration::from_millis(elapsed_ms));
        prop_assert_eq!(store.get("k").is_some(), elapsed_ms < ttl_ms);
    }

    #[test]
    fn prop_hits_plus_misses_equals_gets(
        ops in proptest::collection::vec((any::<bool>(), 0u8..20), 1..200),
    ) {
        let clock = ManualClock::shared(0);
        let config = CacheConfig { capacity: 8, ..Default::default() };
        let store = CacheStore::new(config, clock.clone());
        let mut gets = 0u64;
        for (is_get, key) in ops {
            clock.advance(Duration::from_millis(1));
            let key = format!("k{key}");
            if is_get {
                store.get(&key);
                gets += 1;
            } else {
                store.set(key, json!(1));
            }
            prop_assert!(store.len() <= 8);
        }
        let stats = store.statistics();
        prop_assert_eq!(stats.hits + stats.misses, gets);
        if gets > 0 {
            let expected = stats.hits as f64 / gets as f64;
            prop_assert!((stats.hit_rate - expected).abs() < 1e-9);
        }
    }
}

// ---------------------------------------------------------------------------
// Invalidation and clear
// ---------------------------------------------------------------------------

#[test]
fn test_invalidate_by_prefix_is_idempotent() {
    let store = store_with(ManualClock::shared(0));
    store.set(key("tasks", &["acme", "growth"]), json!([]));
    store.set(competency_key("acme"), json!({}));
    store.set(key("tasks", &["globex", "growth"]), json!([]));

    assert_eq!(store.invalidate_by_prefix("acme"), 2);
    assert_eq!(store.invalidate_by_prefix("acme"), 0);
    assert_eq!(store.keys(), vec!["tasks:globex:growth".to_string()]);
}

#[test]
fn test_empty_pattern_removes_nothing() {
    let store = store_with(ManualClock::shared(0));
    store.set("a", json!(1));
    assert_eq!(store.invalidate_by_prefix(""), 0);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_clear_resets_statistics() {
    let store = store_with(ManualClock::shared(0));
    store.set("a", json!(1));
    store.get("a");
    store.get("b");
    store.clear();
    let stats = store.statistics();
    assert_eq!((stats.hits, stats.misses, stats.evictions, stats.size), (0, 0, 0, 0));
    assert_eq!(stats.hit_rate, 0.0);
}

// ---------------------------------------------------------------------------
// Durable mirror
// ---------------------------------------------------------------------------

#[test]
fn test_sqlite_mirror_warms_a_restarted_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let clock = ManualClock::shared(0);

    {
        let mirror = Arc::new(SqliteMirror::open(&path).unwrap());
        let store = CacheStore::with_mirror(CacheConfig::default(), clock.clone(), mirror);
        store.set_with_ttl("resources:growth", json!({"resources": []}), Duration::from_secs(60));
        store.set_with_ttl("short", json!(1), Duration::from_secs(1));
    }

    clock.advance(Duration::from_secs(30));
    let mirror = Arc::new(SqliteMirror::open(&path).unwrap());
    let store = CacheStore::with_mirror(CacheConfig::default(), clock.clone(), mirror);
    assert_eq!(store.get("resources:growth"), Some(json!({"resources": []})));
    assert!(store.get("short").is_none(), "mirror never extends the TTL");

    let entry = store.entry("resources:growth").unwrap();
    assert_eq!(entry.created_at_ms, 0);

    clock.advance(Duration::from_secs(30));
    assert!(store.get("resources:growth").is_none());
    assert_eq!(clock.now_ms(), 60_000);
}

#[test]
fn test_unavailable_mirror_degrades_to_memory() {
    let mirror = Arc::new(MemoryMirror::new());
    mirror.set_unavailable(true);
    let store =
        CacheStore::with_mirror(CacheConfig::default(), ManualClock::shared(0), mirror.clone());
    store.set("k", json!(1));
    assert_eq!(store.get("k"), Some(json!(1)));
    assert!(mirror.is_empty());
}

// ---------------------------------------------------------------------------
// Sweeper
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sweeper_stops_cleanly() {
    let clock = ManualClock::shared(0);
    let store = Arc::new(store_with(clock.clone()));
    store.set_with_ttl("gone", json!(1), Duration::from_millis(5));
    clock.advance(Duration::from_millis(10));

    let handle = ExpirySweeper::spawn(store.clone(), Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(store.is_empty());

    handle.stop();
    handle.stop();
    handle.shutdown().await;
}
