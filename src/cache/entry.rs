//! Cache Entry Module
//!
//! Defines a cached value together with the metadata eviction and expiry
//! decisions are made from.

use serde::{Deserialize, Serialize};

// == Labeled ==
/// Values that can describe themselves in the event log.
///
/// Events fall back to the entry key when no label is given.
pub trait Labeled {
    fn label(&self) -> Option<String> {
        None
    }
}

impl Labeled for String {}

impl Labeled for Vec<u8> {}

// == Cache Entry ==
/// A single cache entry and its accounting metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<V> {
    /// Unique key
    pub key: String,
    /// Stored payload
    pub value: V,
    /// Bytes counted against the cache capacity
    pub size_bytes: u64,
    /// Admission time (Unix milliseconds)
    pub inserted_at: u64,
    /// Last read or update time (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Number of reads served from this entry
    pub access_count: u64,
    /// Absolute expiry (Unix milliseconds), None = never expires
    pub ttl_expiry: Option<u64>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a freshly admitted entry stamped at `now`.
    pub fn new(
        key: impl Into<String>,
        value: V,
        size_bytes: u64,
        now: u64,
        ttl_expiry: Option<u64>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            size_bytes,
            inserted_at: now,
            last_accessed_at: now,
            access_count: 0,
            ttl_expiry,
        }
    }

    // == Touch ==
    /// Records a read at `now`.
    pub fn touch(&mut self, now: u64) {
        self.last_accessed_at = now;
        self.access_count += 1;
    }

    // == Time To Live ==
    /// Remaining TTL in milliseconds at `now`.
    ///
    /// - `Some(0)` once expired
    /// - `None` when the entry never expires
    pub fn ttl_remaining_ms(&self, now: u64) -> Option<u64> {
        self.ttl_expiry.map(|expiry| expiry.saturating_sub(now))
    }
}

impl<V: Labeled> CacheEntry<V> {
    /// Display label for event records.
    pub fn display_label(&self) -> String {
        self.value.label().unwrap_or_else(|| self.key.clone())
    }
}
