//! # Stage: Cache Store
//!
//! ## Responsibility
//! Bounded key → value cache for derived data (task lists, milestone
//! definitions, competency scores). Each entry carries its own TTL; the store
//! evicts the least recently accessed entries when full and keeps running
//! hit/miss/eviction statistics. An optional [`DurableMirror`] receives every
//! write so a restarted process can warm back up.
//!
//! ## Guarantees
//! - An entry is readable iff `now - created_at < ttl`
//! - Capacity eviction removes the `max(1, floor(len * fraction))` entries with
//!   the smallest `last_accessed_at`, ties broken by insertion order
//! - `hits + misses` equals the number of `get` calls since the last `clear`
//! - Mirror failures are logged and never surface to the caller
//! - Thread-safe: share as `Arc<CacheStore>`; counters are atomic
//!
//! ## NOT Responsible For
//! - Periodic expiry (see [`super::ExpirySweeper`])
//! - Deciding what to cache (callers build keys with [`super::key`])

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::mirror::{DurableMirror, MirrorRecord};
use crate::clock::Clock;
use crate::config::CacheConfig;

// ---------------------------------------------------------------------------
// CacheEntry
// ---------------------------------------------------------------------------

/// A single cached value and its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub created_at_ms: u64,
    pub last_accessed_at_ms: u64,
    pub ttl: Duration,
    pub access_count: u64,
    /// Insertion sequence number; breaks eviction ties.
    seq: u64,
}

impl CacheEntry {
    /// TTL in milliseconds, saturating at `u64::MAX`.
    pub fn ttl_ms(&self) -> u64 {
        u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX)
    }

    /// `true` once `now_ms - created_at_ms >= ttl`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) >= self.ttl_ms()
    }

    fn to_record(&self) -> MirrorRecord {
        MirrorRecord {
            value: self.value.clone(),
            created_at_ms: self.created_at_ms,
            ttl_ms: self.ttl_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// CacheStatistics
// ---------------------------------------------------------------------------

/// Point-in-time copy of the store's counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    /// `hits / (hits + misses)`, or 0.0 before the first `get`.
    pub hit_rate: f64,
}

// ---------------------------------------------------------------------------
// CacheStore
// ---------------------------------------------------------------------------

/// TTL + capacity-bounded cache with an optional durable mirror.
pub struct CacheStore {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    mirror: Option<Arc<dyn DurableMirror>>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    next_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStore {
    /// Memory-only store.
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            mirror: None,
            entries: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Store that writes through to `mirror` and warms from it on miss.
    pub fn with_mirror(
        config: CacheConfig,
        clock: Arc<dyn Clock>,
        mirror: Arc<dyn DurableMirror>,
    ) -> Self {
        Self { mirror: Some(mirror), ..Self::new(config, clock) }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // -----------------------------------------------------------------------
    // Core API
    // -----------------------------------------------------------------------

    /// Look up `key`.
    ///
    /// A primary miss falls back to the mirror; a recovered record keeps its
    /// original `created_at` so the mirror never extends the logical TTL.
    /// Expired entries are deleted (from memory and mirror) and count as misses.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        let mut map = self.lock();

        if !map.contains_key(key) {
            if let Some(record) = self.mirror_load(key) {
                let entry = CacheEntry {
                    key: key.to_string(),
                    value: record.value,
                    created_at_ms: record.created_at_ms,
                    last_accessed_at_ms: now,
                    ttl: Duration::from_millis(record.ttl_ms),
                    access_count: 0,
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                };
                if entry.is_expired(now) {
                    drop(map);
                    self.mirror_remove(key);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                debug!(target: "devpath::cache", key, "promoted entry from durable mirror");
                self.make_room(&mut map, now);
                map.insert(key.to_string(), entry);
            }
        }

        match map.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.access_count += 1;
                entry.last_accessed_at_ms = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                map.remove(key);
                drop(map);
                self.mirror_remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert with the configured default TTL.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let ttl = self.config.default_ttl();
        self.set_with_ttl(key, value, ttl);
    }

    /// Insert or overwrite `key`. Inserting a new key into a full store first
    /// purges expired entries, then evicts by least recent access.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let key = key.into();
        let now = self.clock.now_ms();
        let entry = CacheEntry {
            key: key.clone(),
            value,
            created_at_ms: now,
            last_accessed_at_ms: now,
            ttl,
            access_count: 0,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        let record = entry.to_record();

        let mut map = self.lock();
        if !map.contains_key(&key) {
            self.make_room(&mut map, now);
        }
        map.insert(key.clone(), entry);
        drop(map);

        self.mirror_store(&key, &record);
    }

    /// Typed `get`. A payload that no longer deserializes as `T` reads as `None`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(
                    target: "devpath::cache",
                    key,
                    error = %e,
                    "cached payload has unexpected shape"
                );
                None
            }
        }
    }

    /// Typed `set` with an explicit TTL. Values that fail to serialize are skipped.
    pub fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(v) => self.set_with_ttl(key, v, ttl),
            Err(e) => warn!(
                target: "devpath::cache",
                key = %key,
                error = %e,
                "value not cacheable"
            ),
        }
    }

    /// TTL-checked presence test. Touches neither statistics nor access times.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        self.lock().get(key).is_some_and(|e| !e.is_expired(now))
    }

    /// Remove `key`. Returns `true` if it was held in memory.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.lock().remove(key).is_some();
        self.mirror_remove(key);
        removed
    }

    /// Drop every entry, reset statistics and purge the mirror.
    pub fn clear(&self) {
        self.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        if let Some(m) = &self.mirror {
            if let Err(e) = m.clear() {
                warn!(
                    target: "devpath::cache",
                    error = %e,
                    "mirror clear failed; continuing memory-only"
                );
            }
        }
    }

    /// Delete every entry whose key contains `pattern`. Returns how many
    /// in-memory entries were removed. An empty pattern removes nothing.
    pub fn invalidate_by_prefix(&self, pattern: &str) -> usize {
        if pattern.is_empty() {
            warn!(target: "devpath::cache", "ignoring invalidation with empty pattern");
            return 0;
        }
        let removed = {
            let mut map = self.lock();
            let before = map.len();
            map.retain(|k, _| !k.contains(pattern));
            before - map.len()
        };
        if let Some(m) = &self.mirror {
            if let Err(e) = m.remove_matching(pattern) {
                warn!(target: "devpath::cache", pattern, error = %e, "mirror invalidation failed");
            }
        }
        debug!(target: "devpath::cache", pattern, removed, "invalidated entries");
        removed
    }

    /// Delete every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let expired = {
            let mut map = self.lock();
            Self::purge_expired_locked(&mut map, now)
        };
        for key in &expired {
            self.mirror_remove(key);
        }
        expired.len()
    }

    pub fn statistics(&self) -> CacheStatistics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatistics {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    /// Number of entries held in memory, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of live (non-expired) keys.
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now_ms();
        let mut keys: Vec<String> = self
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Clone of the full entry, for diagnostics. Does not touch statistics.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn purge_expired_locked(map: &mut HashMap<String, CacheEntry>, now: u64) -> Vec<String> {
        let expired: Vec<String> = map
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();
        for k in &expired {
            map.remove(k);
        }
        expired
    }

    /// Purge expired entries, then evict by least recent access if still full.
    fn make_room(&self, map: &mut HashMap<String, CacheEntry>, now: u64) {
        let mut dropped = Self::purge_expired_locked(map, now);
        if map.len() >= self.config.capacity {
            let evicted = self.evict_lru_locked(map);
            self.evictions.fetch_add(evicted.len() as u64, Ordering::Relaxed);
            debug!(
                target: "devpath::cache",
                evicted = evicted.len(),
                size = map.len(),
                "capacity eviction"
            );
            dropped.extend(evicted);
        }
        for key in &dropped {
            self.mirror_remove(key);
        }
    }

    fn evict_lru_locked(&self, map: &mut HashMap<String, CacheEntry>) -> Vec<String> {
        let len = map.len();
        if len == 0 {
            return Vec::new();
        }
        let n = ((len as f64 * self.config.eviction_fraction).floor() as usize).clamp(1, len);
        let mut order: Vec<(u64, u64, &String)> = map
            .values()
            .map(|e| (e.last_accessed_at_ms, e.seq, &e.key))
            .collect();
        order.sort();
        let victims: Vec<String> = order.into_iter().take(n).map(|(_, _, k)| k.clone()).collect();
        for k in &victims {
            map.remove(k);
        }
        victims
    }

    fn mirror_load(&self, key: &str) -> Option<MirrorRecord> {
        let m = self.mirror.as_ref()?;
        match m.load(key) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    target: "devpath::cache",
                    key,
                    error = %e,
                    "mirror read failed; treating as miss"
                );
                None
            }
        }
    }

    fn mirror_store(&self, key: &str, record: &MirrorRecord) {
        if let Some(m) = &self.mirror {
            if let Err(e) = m.store(key, record) {
                warn!(
                    target: "devpath::cache",
                    key,
                    error = %e,
                    "mirror write failed; continuing memory-only"
                );
            }
        }
    }

    fn mirror_remove(&self, key: &str) {
        if let Some(m) = &self.mirror {
            if let Err(e) = m.remove(key) {
                warn!(target: "devpath::cache", key, error = %e, "mirror delete failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::mirror::MemoryMirror;
    use crate::clock::ManualClock;
    use serde_json::json;

    const START: u64 = 1_700_000_000_000;

    fn store_with(capacity: usize) -> (CacheStore, Arc<ManualClock>) {
        let clock = ManualClock::shared(START);
        let cfg = CacheConfig { capacity, ..Default::default() };
        (CacheStore::new(cfg, clock.clone()), clock)
    }

    fn store() -> (CacheStore, Arc<ManualClock>) {
        store_with(50)
    }

    // -- get / set --

    #[test]
    fn test_set_then_get_hits() {
        let (s, _) = store();
        s.set("k", json!(1));
        assert_eq!(s.get("k"), Some(json!(1)));
        let st = s.statistics();
        assert_eq!((st.hits, st.misses), (1, 0));
    }

    #[test]
    fn test_get_unknown_misses() {
        let (s, _) = store();
        assert!(s.get("nope").is_none());
        assert_eq!(s.statistics().misses, 1);
    }

    #[test]
    fn test_overwrite_is_last_write_wins() {
        let (s, _) = store();
        s.set("k", json!("a"));
        s.set("k", json!("b"));
        assert_eq!(s.get("k"), Some(json!("b")));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_hit_updates_access_bookkeeping() {
        let (s, clock) = store();
        s.set("k", json!(1));
        clock.advance(Duration::from_secs(3));
        s.get("k");
        s.get("k");
        let e = s.entry("k").unwrap();
        assert_eq!(e.access_count, 2);
        assert_eq!(e.last_accessed_at_ms, START + 3_000);
        assert_eq!(e.created_at_ms, START);
    }

    // -- TTL --

    #[test]
    fn test_zero_ttl_is_never_readable() {
        let (s, _) = store();
        s.set_with_ttl("k", json!(1), Duration::ZERO);
        assert!(s.get("k").is_none());
        assert_eq!(s.statistics().misses, 1);
        assert!(s.is_empty(), "expired entry must be removed on access");
    }

    #[test]
    fn test_entry_readable_until_just_before_expiry() {
        let (s, clock) = store();
        s.set_with_ttl("k", json!(1), Duration::from_millis(1_000));
        clock.advance(Duration::from_millis(999));
        assert!(s.get("k").is_some());
        clock.advance(Duration::from_millis(1));
        assert!(s.get("k").is_none());
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn test_access_does_not_extend_ttl() {
        let (s, clock) = store();
        s.set_with_ttl("k", json!(1), Duration::from_secs(10));
        clock.advance(Duration::from_secs(9));
        assert!(s.get("k").is_some());
        clock.advance(Duration::from_secs(1));
        assert!(s.get("k").is_none());
    }

    #[test]
    fn test_huge_ttl_saturates_instead_of_wrapping() {
        let (s, clock) = store();
        s.set_with_ttl("k", json!(1), Duration::MAX);
        assert_eq!(s.entry("k").unwrap().ttl_ms(), u64::MAX);
        clock.advance(Duration::from_secs(365 * 86_400));
        assert!(s.get("k").is_some());
    }

    #[test]
    fn test_contains_ignores_expired_and_stats() {
        let (s, clock) = store();
        s.set_with_ttl("k", json!(1), Duration::from_secs(1));
        assert!(s.contains("k"));
        clock.advance(Duration::from_secs(1));
        assert!(!s.contains("k"));
        assert_eq!(s.statistics().hits + s.statistics().misses, 0);
    }

    #[test]
    fn test_purge_expired_removes_only_expired() {
        let (s, clock) = store();
        s.set_with_ttl("short", json!(1), Duration::from_secs(1));
        s.set_with_ttl("long", json!(1), Duration::from_secs(100));
        clock.advance(Duration::from_secs(5));
        assert_eq!(s.purge_expired(), 1);
        assert_eq!(s.keys(), vec!["long".to_string()]);
    }

    // -- eviction --

    #[test]
    fn test_sixty_inserts_into_capacity_fifty() {
        let (s, clock) = store();
        for i in 0..60 {
            s.set_with_ttl(format!("k{i}"), json!(i), Duration::from_secs(300));
            clock.advance(Duration::from_millis(1));
        }
        let st = s.statistics();
        assert!(st.size <= 50, "size {}", st.size);
        assert!(st.evictions >= 10, "evictions {}", st.evictions);
    }

    #[test]
    fn test_eviction_removes_least_recently_accessed() {
        let (s, clock) = store_with(5);
        for i in 0..5 {
            s.set(format!("k{i}"), json!(i));
            clock.advance(Duration::from_millis(10));
        }
        // Touch k0 so k1 becomes the oldest by access time.
        s.get("k0");
        clock.advance(Duration::from_millis(10));
        s.set("new", json!("x"));
        // floor(5 * 0.2) = 1 eviction
        assert_eq!(s.statistics().evictions, 1);
        assert!(s.contains("k0"));
        assert!(!s.contains("k1"));
        assert!(s.contains("new"));
    }

    #[test]
    fn test_eviction_ties_break_by_insertion_order() {
        // Clock never moves: every entry has the same last_accessed_at.
        let (s, _) = store_with(10);
        for i in 0..10 {
            s.set(format!("k{i}"), json!(i));
        }
        s.set("k10", json!(10));
        // floor(10 * 0.2) = 2: k0 and k1 go.
        assert!(!s.contains("k0"));
        assert!(!s.contains("k1"));
        assert!(s.contains("k2"));
        assert_eq!(s.statistics().evictions, 2);
    }

    #[test]
    fn test_eviction_minimum_is_one() {
        let (s, _) = store_with(2);
        s.set("a", json!(1));
        s.set("b", json!(2));
        s.set("c", json!(3));
        assert_eq!(s.statistics().evictions, 1);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_full_store_reclaims_expired_before_evicting() {
        let (s, clock) = store_with(3);
        s.set_with_ttl("dead", json!(0), Duration::from_secs(1));
        s.set("a", json!(1));
        s.set("b", json!(2));
        clock.advance(Duration::from_secs(2));
        s.set("c", json!(3));
        assert_eq!(s.statistics().evictions, 0);
        assert_eq!(s.keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_overwrite_in_full_store_does_not_evict() {
        let (s, _) = store_with(2);
        s.set("a", json!(1));
        s.set("b", json!(2));
        s.set("a", json!(3));
        assert_eq!(s.statistics().evictions, 0);
        assert_eq!(s.len(), 2);
    }

    // -- delete / clear / invalidate --

    #[test]
    fn test_delete() {
        let (s, _) = store();
        s.set("k", json!(1));
        assert!(s.delete("k"));
        assert!(!s.delete("k"));
        assert!(s.get("k").is_none());
    }

    #[test]
    fn test_clear_resets_stats() {
        let (s, _) = store();
        s.set("k", json!(1));
        s.get("k");
        s.get("x");
        s.clear();
        let st = s.statistics();
        assert_eq!((st.hits, st.misses, st.evictions, st.size), (0, 0, 0, 0));
        assert_eq!(st.hit_rate, 0.0);
    }

    #[test]
    fn test_invalidate_by_substring() {
        let (s, _) = store();
        s.set("tasks:cust-1:growth", json!(1));
        s.set("competency:cust-1:current", json!(1));
        s.set("tasks:cust-2:growth", json!(1));
        assert_eq!(s.invalidate_by_prefix("cust-1"), 2);
        assert_eq!(s.invalidate_by_prefix("cust-1"), 0);
        assert_eq!(s.keys(), vec!["tasks:cust-2:growth"]);
    }

    #[test]
    fn test_invalidate_empty_pattern_is_noop() {
        let (s, _) = store();
        s.set("k", json!(1));
        assert_eq!(s.invalidate_by_prefix(""), 0);
        assert_eq!(s.len(), 1);
    }

    // -- statistics --

    #[test]
    fn test_hit_rate() {
        let (s, _) = store();
        s.set("k", json!(1));
        s.get("k");
        s.get("k");
        s.get("k");
        s.get("missing");
        let st = s.statistics();
        assert!((st.hit_rate - 0.75).abs() < 1e-9);
    }

    // -- typed helpers --

    #[test]
    fn test_typed_round_trip() {
        let (s, _) = store();
        s.set_as("v", &vec![1u32, 2, 3], Duration::from_secs(5));
        assert_eq!(s.get_as::<Vec<u32>>("v"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_typed_shape_mismatch_is_none() {
        let (s, _) = store();
        s.set("v", json!("not a number"));
        assert_eq!(s.get_as::<u32>("v"), None);
    }

    // -- mirror --

    #[test]
    fn test_write_through_and_warm_restart() {
        let clock = ManualClock::shared(START);
        let mirror = Arc::new(MemoryMirror::new());
        let first = CacheStore::with_mirror(CacheConfig::default(), clock.clone(), mirror.clone());
        first.set_with_ttl("k", json!({"a": 1}), Duration::from_secs(60));
        drop(first);

        let second = CacheStore::with_mirror(CacheConfig::default(), clock.clone(), mirror.clone());
        clock.advance(Duration::from_secs(30));
        assert_eq!(second.get("k"), Some(json!({"a": 1})));
        assert_eq!(second.statistics().hits, 1);
        // The promoted entry keeps its original creation time.
        assert_eq!(second.entry("k").unwrap().created_at_ms, START);
    }

    #[test]
    fn test_warm_restart_does_not_extend_ttl() {
        let clock = ManualClock::shared(START);
        let mirror = Arc::new(MemoryMirror::new());
        CacheStore::with_mirror(CacheConfig::default(), clock.clone(), mirror.clone())
            .set_with_ttl("k", json!(1), Duration::from_secs(60));

        let second = CacheStore::with_mirror(CacheConfig::default(), clock.clone(), mirror.clone());
        clock.advance(Duration::from_secs(60));
        assert!(second.get("k").is_none());
        assert_eq!(second.statistics().misses, 1);
        assert!(!mirror.contains("k"), "expired record purged from mirror");
    }

    #[test]
    fn test_mirror_failure_degrades_to_memory() {
        let (clock, mirror) = (ManualClock::shared(START), Arc::new(MemoryMirror::new()));
        mirror.set_unavailable(true);
        let s = CacheStore::with_mirror(CacheConfig::default(), clock, mirror.clone());
        s.set("k", json!(1));
        assert_eq!(s.get("k"), Some(json!(1)));
        assert!(s.get("other").is_none());
        s.clear();
        assert_eq!(s.invalidate_by_prefix("k"), 0);
    }

    #[test]
    fn test_mirror_quota_degrades_to_memory() {
        let clock = ManualClock::shared(START);
        let mirror = Arc::new(MemoryMirror::with_quota(16));
        let s = CacheStore::with_mirror(CacheConfig::default(), clock, mirror.clone());
        s.set("big", json!("x".repeat(500)));
        assert!(s.get("big").is_some());
        assert!(mirror.is_empty());
    }

    #[test]
    fn test_clear_purges_mirror() {
        let clock = ManualClock::shared(START);
        let mirror = Arc::new(MemoryMirror::new());
        let s = CacheStore::with_mirror(CacheConfig::default(), clock, mirror.clone());
        s.set("k", json!(1));
        s.clear();
        assert!(mirror.is_empty());
        assert!(s.get("k").is_none());
    }

    #[test]
    fn test_invalidate_reaches_mirror() {
        let clock = ManualClock::shared(START);
        let mirror = Arc::new(MemoryMirror::new());
        let s = CacheStore::with_mirror(CacheConfig::default(), clock, mirror.clone());
        s.set("tasks:c1:growth", json!(1));
        s.invalidate_by_prefix("c1");
        assert!(!mirror.contains("tasks:c1:growth"));
    }
}
