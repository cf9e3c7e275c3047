//! Cached entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A locally cached value.
///
/// `version` is monotonic and derived from the creation time, so a newer
/// write of the same key always carries a larger version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Cache key.
    pub key: String,
    /// Opaque serialized payload.
    #[serde(with = "crate::payload")]
    pub data: Vec<u8>,
    /// Monotonic version (nanoseconds since the epoch at write time).
    pub version: i64,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
    /// When the entry stops being readable, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// When the entry was confirmed written remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Returns true if the entry has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Returns true once the entry has been confirmed remotely.
    pub fn is_synced(&self) -> bool {
        self.synced_at.is_some()
    }
}
