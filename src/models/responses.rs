//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheEntry, CacheEvent};
use crate::orchestrator::{CacheAccess, MemoryUsage};
use crate::store::{Item, ItemSummary};

/// Response body for GET /items/:id
#[derive(Debug, Clone, Serialize)]
pub struct ItemResponse {
    pub item: Item,
    /// "hit" or "miss"
    pub source: CacheAccess,
    /// Served by a fetch another request had already started
    pub coalesced: bool,
}

/// Response body for GET /items
#[derive(Debug, Clone, Serialize)]
pub struct ItemsResponse {
    pub items: Vec<ItemSummary>,
}

/// Response body for GET /cache
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheResponse {
    /// Cached entries in insertion order
    pub entries: Vec<CacheEntry<Item>>,
    pub usage: MemoryUsage,
    /// Keys with a backing-store fetch in flight
    pub loading: Vec<String>,
}

/// Response body for DELETE /items/:id
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
    /// False when the key was not cached
    pub removed: bool,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>, removed: bool) -> Self {
        let key = key.into();
        let message = if removed {
            format!("Key '{}' removed from cache", key)
        } else {
            format!("Key '{}' was not cached", key)
        };
        Self {
            message,
            key,
            removed,
        }
    }
}

/// Response body for GET /events
#[derive(Debug, Clone, Serialize)]
pub struct EventsResponse {
    /// Newest first
    pub events: Vec<CacheEvent>,
}

/// Plain acknowledgement for state-changing endpoints
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
