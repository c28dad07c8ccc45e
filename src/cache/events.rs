//! Event Log Module
//!
//! Bounded, newest-first record of cache activity.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of records the log retains.
pub const EVENT_LOG_CAPACITY: usize = 50;

// == Event Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Hit,
    Miss,
    Add,
    Update,
    Delete,
    Eviction,
    Expired,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Eviction => "eviction",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

// == Cache Event ==
/// One entry in the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEvent {
    pub kind: EventKind,
    pub key: String,
    /// Human readable name of the item involved
    pub label: String,
    /// Unix milliseconds
    pub timestamp: u64,
}

impl CacheEvent {
    pub fn new(
        kind: EventKind,
        key: impl Into<String>,
        label: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            label: label.into(),
            timestamp,
        }
    }
}

// == Event Log ==
/// Newest-first ring of the last [`EVENT_LOG_CAPACITY`] events.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<CacheEvent>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    // == Record ==
    /// Adds a single event at the head of the log.
    pub fn record(&mut self, event: CacheEvent) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    // == Record Batch ==
    /// Adds a primary event and the events it caused.
    ///
    /// The batch lands at the head in order: `primary` first, then each
    /// follower, so an eviction always sits directly below the add or miss
    /// that triggered it.
    pub fn record_batch(&mut self, primary: CacheEvent, followers: Vec<CacheEvent>) {
        for event in followers.into_iter().rev() {
            self.events.push_front(event);
        }
        self.events.push_front(primary);
        self.events.truncate(self.capacity);
    }

    /// Snapshot of the log, newest first.
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.iter().cloned().collect()
    }

    /// Replaces the log contents, keeping the newest-first order given.
    pub fn restore(&mut self, events: Vec<CacheEvent>) {
        self.events = events.into_iter().take(self.capacity).collect();
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
