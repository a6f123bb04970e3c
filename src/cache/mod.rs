//! # Module: cache
//!
//! TTL + capacity-bounded cache for derived data, with a durable mirror for
//! warm restarts and a background expiry sweep.
//!
//! ## Sub-modules
//! - [`store`]: the in-memory store, statistics and eviction
//! - [`mirror`]: durable mirror trait with SQLite and in-memory backends
//! - [`sweeper`]: cancellable periodic expiry sweep

pub mod mirror;
pub mod store;
pub mod sweeper;

pub use mirror::{DurableMirror, MemoryMirror, MirrorRecord, SqliteMirror};
pub use store::{CacheEntry, CacheStatistics, CacheStore};
pub use sweeper::{ExpirySweeper, SweepHandle};

/// Build a composite cache key: `kind:part:part...`.
///
/// Customer-scoped keys put the customer id second so that
/// [`CacheStore::invalidate_by_prefix`] with the id reaches them.
pub fn key(kind: &str, parts: &[&str]) -> String {
    let mut k = String::from(kind);
    for p in parts {
        k.push(':');
        k.push_str(p);
    }
    k
}

/// Key of a customer's cached competency scores.
pub fn competency_key(customer_id: &str) -> String {
    key("competency", &[customer_id, "current"])
}
