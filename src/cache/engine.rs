//! Cache Engine Module
//!
//! Byte-budgeted keyed store. Combines insertion-ordered storage with a
//! pluggable eviction selector and an invalidation policy, and buffers the
//! raw `eviction`/`expired` events it produces for the caller to drain.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::cache::{
    CacheEntry, CacheEvent, Clock, EventKind, EvictionPolicy, EvictionSelector,
    InvalidationPolicy, Invalidator, Labeled, SystemClock,
};
use crate::error::{CacheError, Result};

// == Engine Options ==
/// Construction-time policy configuration.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub eviction: EvictionPolicy,
    pub invalidation: InvalidationPolicy,
    /// Remove stale entries as soon as a read notices them
    pub delete_on_expire: bool,
    /// Optional bound on the number of entries
    pub max_keys: Option<usize>,
    /// Seed for the RANDOM selector
    pub seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            eviction: EvictionPolicy::Lru,
            invalidation: InvalidationPolicy::None,
            delete_on_expire: true,
            max_keys: None,
            seed: None,
        }
    }
}

// == Cache Engine ==
/// Keyed store holding at most `capacity_bytes` worth of entries.
///
/// `current_bytes` always equals the sum of the sizes of the entries present.
#[derive(Debug)]
pub struct CacheEngine<V> {
    /// Entries in insertion order
    entries: IndexMap<String, CacheEntry<V>>,
    capacity_bytes: u64,
    current_bytes: u64,
    max_keys: Option<usize>,
    selector: EvictionSelector,
    invalidator: Invalidator,
    delete_on_expire: bool,
    clock: Arc<dyn Clock>,
    /// Raw events not yet drained by the caller
    pending: Vec<CacheEvent>,
}

impl<V: Labeled> CacheEngine<V> {
    // == Constructor ==
    /// Creates an engine backed by the system clock.
    pub fn new(capacity_bytes: u64, options: EngineOptions) -> Result<Self> {
        Self::with_clock(capacity_bytes, options, Arc::new(SystemClock))
    }

    /// Creates an engine reading time from `clock`.
    ///
    /// Fails with `InvalidPolicyConfiguration` for a zero capacity, a zero
    /// key bound, or event invalidation without a predicate.
    pub fn with_clock(
        capacity_bytes: u64,
        options: EngineOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if capacity_bytes == 0 {
            return Err(CacheError::InvalidPolicyConfiguration(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if options.max_keys == Some(0) {
            return Err(CacheError::InvalidPolicyConfiguration(
                "max_keys must be greater than zero when set".to_string(),
            ));
        }

        Ok(Self {
            entries: IndexMap::new(),
            capacity_bytes,
            current_bytes: 0,
            max_keys: options.max_keys,
            selector: EvictionSelector::new(options.eviction, options.seed),
            invalidator: Invalidator::new(options.invalidation)?,
            delete_on_expire: options.delete_on_expire,
            clock,
            pending: Vec::new(),
        })
    }

    // == Get ==
    /// Returns the value for `key` and records the access.
    ///
    /// Stale entries read as absent.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let now = self.clock.now_ms();
        if self.check_stale(key, now) {
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.touch(now);
        Some(&entry.value)
    }

    // == Touch ==
    /// Counts an access to `key` without checking freshness. Returns false
    /// if the key is absent.
    pub fn touch(&mut self, key: &str) -> bool {
        let now = self.clock.now_ms();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(now);
                true
            }
            None => false,
        }
    }

    // == Has ==
    /// True if `key` is present and fresh. Does not count as an access.
    pub fn has(&mut self, key: &str) -> bool {
        let now = self.clock.now_ms();
        !self.check_stale(key, now) && self.entries.contains_key(key)
    }

    // == Peek ==
    /// Raw entry lookup with no side effects, stale or not.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    // == Put ==
    /// Admits or overwrites `key`, evicting until it fits.
    ///
    /// Overwriting keeps the entry's insertion position and counters.
    /// Returns the keys evicted to make room.
    pub fn put(
        &mut self,
        key: impl Into<String>,
        value: V,
        size_bytes: u64,
        ttl: Option<Duration>,
    ) -> Result<Vec<String>> {
        let key = key.into();
        let evicted = self.make_room(&key, size_bytes)?;

        let now = self.clock.now_ms();
        let ttl_expiry = self.invalidator.expiry_for(now, ttl);

        match self.entries.get_mut(&key) {
            Some(entry) => {
                self.current_bytes = self.current_bytes - entry.size_bytes + size_bytes;
                entry.value = value;
                entry.size_bytes = size_bytes;
                entry.last_accessed_at = now;
                entry.ttl_expiry = ttl_expiry;
            }
            None => {
                let entry = CacheEntry::new(key.clone(), value, size_bytes, now, ttl_expiry);
                self.entries.insert(key, entry);
                self.current_bytes += size_bytes;
            }
        }

        Ok(evicted)
    }

    // == Modify ==
    /// Patches a fresh entry in place and refreshes its access time.
    ///
    /// The entry's accounted size is unchanged.
    pub fn modify<F>(&mut self, key: &str, patch: F) -> Option<&V>
    where
        F: FnOnce(&mut V),
    {
        let now = self.clock.now_ms();
        if self.check_stale(key, now) {
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        patch(&mut entry.value);
        entry.last_accessed_at = now;
        Some(&entry.value)
    }

    // == Delete ==
    /// Removes `key`. Returns false if it was already absent.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    // == Clear ==
    /// Drops every entry. Pending events are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_bytes = 0;
    }

    // == Purge Expired ==
    /// Removes all stale entries, emitting `expired` for each.
    ///
    /// A no-op when delete-on-expire is disabled.
    pub fn purge_expired(&mut self) -> usize {
        if !self.delete_on_expire {
            return 0;
        }

        let now = self.clock.now_ms();
        let stale: Vec<String> = self
            .entries
            .values()
            .filter(|entry| self.invalidator.is_stale(entry, now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &stale {
            if let Some(entry) = self.remove_entry(key) {
                self.emit(EventKind::Expired, &entry, now);
            }
        }
        stale.len()
    }

    // == Restore ==
    /// Replaces the contents with previously saved entries.
    ///
    /// Byte usage is recomputed from the entries themselves. Entries larger
    /// than the capacity are skipped; overflow evicts as `put` would.
    /// Returns the number of entries kept.
    pub fn restore(&mut self, entries: Vec<CacheEntry<V>>) -> usize {
        self.clear();

        for entry in entries {
            if let Err(err) = self.make_room(&entry.key, entry.size_bytes) {
                warn!("Skipping restored entry '{}': {}", entry.key, err);
                continue;
            }
            if let Some(previous) = self.entries.get(&entry.key) {
                self.current_bytes -= previous.size_bytes;
            }
            self.current_bytes += entry.size_bytes;
            self.entries.insert(entry.key.clone(), entry);
        }

        let evicted = self.take_events().len();
        if evicted > 0 {
            warn!("Restore evicted {} entries to fit capacity", evicted);
        }
        self.entries.len()
    }

    // == Take Events ==
    /// Drains the raw events emitted since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<CacheEvent> {
        std::mem::take(&mut self.pending)
    }

    // == Accessors ==
    /// Bytes currently in use.
    pub fn size(&self) -> u64 {
        self.current_bytes
    }

    /// Number of entries present, stale ones included.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity_bytes
    }

    /// Fraction of the byte budget in use.
    pub fn memory_usage(&self) -> f64 {
        self.current_bytes as f64 / self.capacity_bytes as f64
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry<V>> {
        self.entries.values()
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.selector.policy()
    }

    pub fn invalidation_policy(&self) -> &InvalidationPolicy {
        self.invalidator.policy()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // == Internals ==

    /// Evicts until `size_bytes` fits under `key`, which is never a victim.
    fn make_room(&mut self, key: &str, size_bytes: u64) -> Result<Vec<String>> {
        if size_bytes > self.capacity_bytes {
            return Err(CacheError::ItemTooLarge {
                size: size_bytes,
                capacity: self.capacity_bytes,
            });
        }

        let reclaimed = self.entries.get(key).map(|entry| entry.size_bytes);
        let is_overwrite = reclaimed.is_some();
        let mut evicted = Vec::new();

        while self.needs_room(reclaimed.unwrap_or(0), size_bytes, is_overwrite) {
            let Some(victim) = self.selector.select_victim(&self.entries, Some(key)) else {
                return Err(CacheError::Internal(format!(
                    "no eviction candidate while admitting '{}'",
                    key
                )));
            };

            if let Some(entry) = self.remove_entry(&victim) {
                debug!(
                    "Evicted '{}' ({} bytes) under {} to admit '{}'",
                    victim,
                    entry.size_bytes,
                    self.selector.policy(),
                    key
                );
                let now = self.clock.now_ms();
                self.emit(EventKind::Eviction, &entry, now);
            }
            evicted.push(victim);
        }

        Ok(evicted)
    }

    fn needs_room(&self, reclaimed: u64, size_bytes: u64, is_overwrite: bool) -> bool {
        let over_budget = self.current_bytes - reclaimed + size_bytes > self.capacity_bytes;
        let over_keys = !is_overwrite
            && self
                .max_keys
                .is_some_and(|max| self.entries.len() >= max);
        over_budget || over_keys
    }

    /// Removes a stale entry (when configured) and reports staleness.
    fn check_stale(&mut self, key: &str, now: u64) -> bool {
        let stale = match self.entries.get(key) {
            Some(entry) => self.invalidator.is_stale(entry, now),
            None => return false,
        };
        if !stale {
            return false;
        }

        if self.delete_on_expire {
            if let Some(entry) = self.remove_entry(key) {
                self.emit(EventKind::Expired, &entry, now);
            }
        } else if let Some(entry) = self.entries.get(key) {
            let event = CacheEvent::new(EventKind::Expired, key, entry.display_label(), now);
            self.pending.push(event);
        }
        true
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.shift_remove(key)?;
        self.current_bytes -= entry.size_bytes;
        Some(entry)
    }

    fn emit(&mut self, kind: EventKind, entry: &CacheEntry<V>, now: u64) {
        self.pending.push(CacheEvent::new(
            kind,
            entry.key.clone(),
            entry.display_label(),
            now,
        ));
    }
}
