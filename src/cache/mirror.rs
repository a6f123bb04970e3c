//! # Stage: Durable Cache Mirror
//!
//! ## Responsibility
//! Secondary, slower, persistent copy of cache entries (and per-customer
//! completion ledgers) so a restarted process can warm its cache. Each cache
//! key maps to one record `{value, created_at_ms, ttl_ms}` stored as a JSON
//! blob; each customer maps to one ledger blob.
//!
//! ## Guarantees
//! - Every method returns `Result`; callers decide how to degrade
//! - `remove_matching` uses the same substring semantics as the in-memory store
//!
//! ## NOT Responsible For
//! - Expiry (the store checks TTLs using the original `created_at_ms`)
//! - Being authoritative: memory wins for the lifetime of the process

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::tracker::CompletionLedger;

/// What the mirror keeps for one cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    pub value: serde_json::Value,
    pub created_at_ms: u64,
    pub ttl_ms: u64,
}

/// Persistent backing for [`super::CacheStore`] and the completion tracker.
pub trait DurableMirror: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<MirrorRecord>, MirrorError>;
    fn store(&self, key: &str, record: &MirrorRecord) -> Result<(), MirrorError>;
    fn remove(&self, key: &str) -> Result<(), MirrorError>;
    /// Remove every record whose key contains `pattern`. Returns the count removed.
    fn remove_matching(&self, pattern: &str) -> Result<usize, MirrorError>;
    /// Remove every cache record. Ledgers are kept.
    fn clear(&self) -> Result<(), MirrorError>;
    fn load_ledger(&self, customer_id: &str) -> Result<Option<CompletionLedger>, MirrorError>;
    fn store_ledger(&self, customer_id: &str, ledger: &CompletionLedger) -> Result<(), MirrorError>;
}

// ---------------------------------------------------------------------------
// SqliteMirror
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cache_entries (
        key  TEXT PRIMARY KEY,
        blob TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS completion_ledgers (
        customer_id TEXT PRIMARY KEY,
        blob        TEXT NOT NULL
    );
";

/// SQLite-backed mirror.
pub struct SqliteMirror {
    conn: Mutex<Connection>,
}

impl SqliteMirror {
    /// Open (or create) a mirror database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MirrorError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// A throwaway mirror that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self, MirrorError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, MirrorError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl DurableMirror for SqliteMirror {
    fn load(&self, key: &str) -> Result<Option<MirrorRecord>, MirrorError> {
        let blob: Option<String> = self
            .conn()
            .query_row(
                "SELECT blob FROM cache_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match blob {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }

    fn store(&self, key: &str, record: &MirrorRecord) -> Result<(), MirrorError> {
        let blob = serde_json::to_string(record)?;
        self.conn().execute(
            "INSERT INTO cache_entries (key, blob) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET blob = excluded.blob",
            params![key, blob],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MirrorError> {
        self.conn().execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn remove_matching(&self, pattern: &str) -> Result<usize, MirrorError> {
        let n = self
            .conn()
            .execute("DELETE FROM cache_entries WHERE instr(key, ?1) > 0", params![pattern])?;
        Ok(n)
    }

    fn clear(&self) -> Result<(), MirrorError> {
        self.conn().execute("DELETE FROM cache_entries", [])?;
        Ok(())
    }

    fn load_ledger(&self, customer_id: &str) -> Result<Option<CompletionLedger>, MirrorError> {
        let blob: Option<String> = self
            .conn()
            .query_row(
                "SELECT blob FROM completion_ledgers WHERE customer_id = ?1",
                params![customer_id],
                |row| row.get(0),
            )
            .optional()?;
        match blob {
            Some(b) => Ok(Some(serde_json::from_str(&b)?)),
            None => Ok(None),
        }
    }

    fn store_ledger(
        &self,
        customer_id: &str,
        ledger: &CompletionLedger,
    ) -> Result<(), MirrorError> {
        let blob = serde_json::to_string(ledger)?;
        self.conn().execute(
            "INSERT INTO completion_ledgers (customer_id, blob) VALUES (?1, ?2)
             ON CONFLICT(customer_id) DO UPDATE SET blob = excluded.blob",
            params![customer_id, blob],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryMirror
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryMirrorState {
    entries: HashMap<String, String>,
    ledgers: HashMap<String, String>,
    unavailable: bool,
}

impl MemoryMirrorState {
    fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// In-process mirror with an optional byte quota, modelling browser-style
/// storage limits. Blobs are serialized exactly like the SQLite mirror.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    state: Mutex<MemoryMirrorState>,
    quota_bytes: Option<usize>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mirror whose cache records may not exceed `quota_bytes` in total.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self { quota_bytes: Some(quota_bytes), ..Default::default() }
    }

    /// Make every subsequent call fail with [`MirrorError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryMirrorState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn available(&self) -> Result<MutexGuard<'_, MemoryMirrorState>, MirrorError> {
        let guard = self.lock();
        if guard.unavailable {
            return Err(MirrorError::Unavailable("memory mirror switched off".into()));
        }
        Ok(guard)
    }
}

impl DurableMirror for MemoryMirror {
    fn load(&self, key: &str) -> Result<Option<MirrorRecord>, MirrorError> {
        let state = self.available()?;
        match state.entries.get(key) {
            Some(b) => Ok(Some(serde_json::from_str(b)?)),
            None => Ok(None),
        }
    }

    fn store(&self, key: &str, record: &MirrorRecord) -> Result<(), MirrorError> {
        let blob = serde_json::to_string(record)?;
        let mut state = self.available()?;
        if let Some(quota) = self.quota_bytes {
            let replaced = state.entries.get(key).map(|old| key.len() + old.len()).unwrap_or(0);
            let used = state.used_bytes() - replaced;
            let needed = key.len() + blob.len();
            if used + needed > quota {
                return Err(MirrorError::QuotaExceeded {
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }
        state.entries.insert(key.to_string(), blob);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MirrorError> {
        self.available()?.entries.remove(key);
        Ok(())
    }

    fn remove_matching(&self, pattern: &str) -> Result<usize, MirrorError> {
        let mut state = self.available()?;
        let before = state.entries.len();
        state.entries.retain(|k, _| !k.contains(pattern));
        Ok(before - state.entries.len())
    }

    fn clear(&self) -> Result<(), MirrorError> {
        self.available()?.entries.clear();
        Ok(())
    }

    fn load_ledger(&self, customer_id: &str) -> Result<Option<CompletionLedger>, MirrorError> {
        let state = self.available()?;
        match state.ledgers.get(customer_id) {
            Some(b) => Ok(Some(serde_json::from_str(b)?)),
            None => Ok(None),
        }
    }

    fn store_ledger(
        &self,
        customer_id: &str,
        ledger: &CompletionLedger,
    ) -> Result<(), MirrorError> {
        let blob = serde_json::to_string(ledger)?;
        self.available()?.ledgers.insert(customer_id.to_string(), blob);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
