//! Cache Module
//!
//! Byte-budgeted in-memory caching with pluggable eviction, TTL or
//! event-driven invalidation, access metrics and an activity log.

mod clock;
mod engine;
mod entry;
mod events;
mod eviction;
mod stats;
mod ttl;


// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use engine::{CacheEngine, EngineOptions};
pub use entry::{CacheEntry, Labeled};
pub use events::{CacheEvent, EventKind, EventLog, EVENT_LOG_CAPACITY};
pub use eviction::{EvictionPolicy, EvictionSelector};
pub use stats::{Metrics, StatsRecorder};
pub use ttl::{is_expired, InvalidationPolicy, Invalidator, StalePredicate};

// == Public Constants ==
/// Default byte budget (1 MiB)
pub const DEFAULT_CAPACITY_BYTES: u64 = 1024 * 1024;
