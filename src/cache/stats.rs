//! Cache Statistics Module
//!
//! Derives hit, miss, eviction and expiry counters from cache events.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheEvent, EventKind};

// == Metrics ==
/// Point-in-time view of the counters and their derived rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Hits plus misses
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room
    pub evictions: u64,
    /// Entries found stale on read or sweep
    #[serde(default)]
    pub expirations: u64,
    /// hits / total_requests, 0 when there were no requests
    pub hit_rate: f64,
    /// misses / total_requests, 0 when there were no requests
    pub miss_rate: f64,
}

// == Stats Recorder ==
/// Running counters fed by cache events.
#[derive(Debug, Clone, Default)]
pub struct StatsRecorder {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl StatsRecorder {
    // == Constructor ==
    /// Creates a recorder with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes counting from a previously taken snapshot.
    ///
    /// `total_requests` is recomputed from hits and misses.
    pub fn from_metrics(metrics: &Metrics) -> Self {
        Self {
            hits: metrics.hits,
            misses: metrics.misses,
            evictions: metrics.evictions,
            expirations: metrics.expirations,
        }
    }

    // == Observe ==
    /// Updates the counters for one event.
    pub fn observe(&mut self, event: &CacheEvent) {
        match event.kind {
            EventKind::Hit => self.hits += 1,
            EventKind::Miss => self.misses += 1,
            EventKind::Eviction => self.evictions += 1,
            EventKind::Expired => self.expirations += 1,
            EventKind::Add | EventKind::Update | EventKind::Delete => {}
        }
    }

    pub fn observe_all<'a>(&mut self, events: impl IntoIterator<Item = &'a CacheEvent>) {
        for event in events {
            self.observe(event);
        }
    }

    // == Total Requests ==
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    // == Hit Rate ==
    /// Returns hits / total_requests, or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.total_requests())
    }

    // == Miss Rate ==
    pub fn miss_rate(&self) -> f64 {
        ratio(self.misses, self.total_requests())
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> Metrics {
        Metrics {
            total_requests: self.total_requests(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
            hit_rate: self.hit_rate(),
            miss_rate: self.miss_rate(),
        }
    }

    // == Reset ==
    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
