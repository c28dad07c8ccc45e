//! Cache Aside - a byte-budgeted in-memory cache in front of a backing store
//!
//! Pluggable eviction (LRU, LFU, FIFO, RANDOM), TTL or event-driven
//! invalidation, hit/miss metrics and an activity log, orchestrated as
//! cache-aside reads and write-through writes.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod store;
pub mod tasks;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{CacheError, Result};
pub use orchestrator::Orchestrator;
pub use tasks::spawn_cleanup_task;
