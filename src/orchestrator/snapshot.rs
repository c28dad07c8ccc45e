//! Snapshot persistence
//!
//! Serializes cached entries, metrics and the event log to JSON so a
//! restarted server can pick up where it left off.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Orchestrator;
use crate::cache::{CacheEntry, CacheEvent, Metrics, StatsRecorder};
use crate::error::Result;
use crate::store::Item;

// == Snapshot ==
/// Persisted form: `{ entries: [[key, entry], ...], metrics, events }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub entries: Vec<(String, CacheEntry<Item>)>,
    pub metrics: Metrics,
    /// Newest first
    pub events: Vec<CacheEvent>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Orchestrator {
    /// Captures the current cache state.
    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().await;
        Snapshot {
            entries: state
                .engine
                .entries()
                .map(|entry| (entry.key.clone(), entry.clone()))
                .collect(),
            metrics: state.stats.snapshot(),
            events: state.log.events(),
            saved_at: Some(Utc::now()),
        }
    }

    /// Replaces the cache state with `snapshot`.
    ///
    /// Byte usage is recomputed from the entries; entries that no longer fit
    /// the capacity are dropped. Returns the number of entries restored.
    pub async fn restore(&self, snapshot: Snapshot) -> usize {
        let entries = snapshot
            .entries
            .into_iter()
            .map(|(key, mut entry)| {
                entry.key = key;
                entry
            })
            .collect();

        let mut state = self.state.lock().await;
        let restored = state.engine.restore(entries);
        state.stats = StatsRecorder::from_metrics(&snapshot.metrics);
        state.log.restore(snapshot.events);
        restored
    }

    /// Writes a snapshot to `path` as JSON.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot().await;
        let json = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(path, json).await?;

        info!(
            "Saved {} cache entries to {}",
            snapshot.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// Restores from a snapshot previously written by [`Orchestrator::save_to`].
    pub async fn load_from(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let json = tokio::fs::read(path).await?;
        let snapshot: Snapshot = serde_json::from_slice(&json)?;
        let restored = self.restore(snapshot).await;

        info!("Restored {} cache entries from {}", restored, path.display());
        Ok(restored)
    }
}
