//! Result cache for expensive reports
//!
//! Reports are serialized to JSON and stored under a string key with a
//! time-to-live. Two backends exist:
//! - [`MemoryCache`]: process-local map, gone on exit
//! - [`Database`](crate::db::Database): `report_cache` table, survives restarts
//!
//! Concurrent misses for the same key may both recompute and both write;
//! the last write wins.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Key/value store with per-entry expiry.
pub trait ResultCache: Send + Sync {
    /// Fetch a live entry. Expired entries read as `None`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous entry.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Drop the entry for `key` if present.
    fn invalidate(&self, key: &str) -> Result<()>;
}

/// Expiry instant for an entry written at `now` with `ttl`.
pub(crate) fn expires_at(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone)]
struct CachedReport {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory report cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CachedReport>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until the next write.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, CachedReport>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Source("report cache lock poisoned".to_string()))
    }

    fn cleanup_expired(entries: &mut HashMap<String, CachedReport>, now: DateTime<Utc>) {
        entries.retain(|_, cached| cached.expires_at > now);
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries()?;
        Ok(entries
            .get(key)
            .filter(|cached| cached.expires_at > Utc::now())
            .map(|cached| cached.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries()?;
        let now = Utc::now();
        Self::cleanup_expired(&mut entries, now);
        entries.insert(
            key.to_string(),
            CachedReport {
                value: value.to_string(),
                expires_at: expires_at(now, ttl),
            },
        );
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}
