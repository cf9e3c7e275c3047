//! Local key/value cache with optional expiry.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tidemark_protocol::CacheEntry;

/// Thread-safe cache of serialized values.
///
/// Expired entries are never returned. They are evicted lazily when read,
/// or in bulk by [`LocalCache::purge_expired`].
pub struct LocalCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    last_version: AtomicI64,
}

impl LocalCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            last_version: AtomicI64::new(0),
        }
    }

    /// Serializes `value` as JSON and stores it under `key`.
    ///
    /// A zero `ttl` means the entry never expires. Returns the entry version.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> SyncResult<i64> {
        let data = serde_json::to_vec(value)?;
        Ok(self.set_raw(key, data, ttl))
    }

    /// Stores already-serialized bytes under `key`, replacing any entry.
    pub fn set_raw(&self, key: &str, data: Vec<u8>, ttl: Duration) -> i64 {
        let now = Utc::now();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl))
        };
        let version = self.next_version(now);
        let entry = CacheEntry {
            key: key.to_string(),
            data,
            version,
            cached_at: now,
            expires_at,
            synced_at: None,
        };
        self.entries.write().insert(key.to_string(), entry);
        tracing::trace!(key, version, "cache entry written");
        version
    }

    /// Reads and deserializes the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the key is absent or expired, and a
    /// codec error if the stored bytes do not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> SyncResult<T> {
        let entry = self
            .entry(key)
            .ok_or_else(|| SyncError::NotFound(key.to_string()))?;
        Ok(serde_json::from_slice(&entry.data)?)
    }

    /// Returns the live entry under `key`, evicting it if it has expired.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.read().get(key).cloned()?;
        if !entry.is_expired_at(Utc::now()) {
            return Some(entry);
        }

        let mut entries = self.entries.write();
        // A concurrent write may have replaced the expired entry.
        if entries
            .get(key)
            .is_some_and(|current| current.version == entry.version)
        {
            entries.remove(key);
            tracing::debug!(key, "evicted expired cache entry");
        }
        None
    }

    /// Removes `key`. Returns true if an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Returns live entries written strictly after `since`, oldest first.
    pub fn get_modified(&self, since: DateTime<Utc>) -> Vec<CacheEntry> {
        let now = Utc::now();
        let mut modified: Vec<_> = self
            .entries
            .read()
            .values()
            .filter(|entry| entry.cached_at > since && !entry.is_expired_at(now))
            .cloned()
            .collect();
        modified.sort_by_key(|entry| entry.version);
        modified
    }

    /// Stamps `synced_at` on `key` if its cached bytes equal `data`.
    ///
    /// A newer local write of the key is left unsynced.
    pub fn mark_synced(&self, key: &str, data: &[u8]) -> bool {
        let now = Utc::now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if entry.data == data && !entry.is_expired_at(now) => {
                entry.synced_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Drops every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, "purged expired cache entries");
        }
        purged
    }

    /// Returns the number of stored entries, including expired ones not yet
    /// evicted.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn next_version(&self, now: DateTime<Utc>) -> i64 {
        let candidate = now.timestamp_nanos_opt().unwrap_or(i64::MAX);
        let previous = self
            .last_version
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        candidate.max(previous.saturating_add(1))
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}
