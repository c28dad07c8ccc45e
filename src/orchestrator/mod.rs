//! Orchestrator Module
//!
//! Cache-aside reads and write-through writes over a [`BackingStore`]. Owns
//! the engine, the metrics recorder and the event log behind one lock so
//! that every operation updates all three atomically.

mod loading;
mod snapshot;
mod stress;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{
    CacheEngine, CacheEntry, CacheEvent, EventKind, EventLog, Metrics, StatsRecorder,
};
use crate::error::{CacheError, Result};
use crate::store::{BackingStore, Item, ItemPatch, ItemSummary, NewItem};

use loading::{Claim, LoadGuard, LoadingSet};

pub use snapshot::Snapshot;
pub use stress::{
    BulkFillOptions, BulkFillReport, FillControl, FillRun, StopSignal, MAX_BULK_FILL_ITERATIONS,
};

/// Size range picked for created items that arrive without one.
pub const MIN_RANDOM_ITEM_SIZE: u64 = 512;
pub const MAX_RANDOM_ITEM_SIZE: u64 = 1536;

// == Outcomes ==
/// Whether a read was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheAccess {
    Hit,
    Miss,
}

/// Result of [`Orchestrator::get`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lookup {
    /// None when the backing store has no such id
    pub item: Option<Item>,
    pub access: CacheAccess,
    /// The read waited on a fetch another caller had already started
    pub coalesced: bool,
}

/// Whether an update reached the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WriteThrough {
    Committed,
    /// The store write failed; only the cached copy changed
    Degraded { reason: String },
}

/// Result of [`Orchestrator::update`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub item: Item,
    /// The cached copy was patched
    pub cached: bool,
    pub write_through: WriteThrough,
}

/// Byte usage of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub item_count: usize,
    /// `used_bytes / capacity_bytes`
    pub usage: f64,
}

// == Cache State ==
#[derive(Debug)]
struct CacheState {
    engine: CacheEngine<Item>,
    stats: StatsRecorder,
    log: EventLog,
}

impl CacheState {
    /// Logs and counts the raw events the engine produced since the last drain.
    fn flush(&mut self) {
        for event in self.engine.take_events() {
            self.stats.observe(&event);
            self.log.record(event);
        }
    }

    /// Logs `primary` immediately followed by the engine's pending events.
    fn record_batch(&mut self, primary: CacheEvent) {
        let followers = self.engine.take_events();
        self.stats.observe(&primary);
        self.stats.observe_all(&followers);
        self.log.record_batch(primary, followers);
    }

    fn event(&self, kind: EventKind, key: &str, label: impl Into<String>) -> CacheEvent {
        CacheEvent::new(kind, key, label, self.engine.now_ms())
    }
}

// == Miss Fetch ==
/// Fetches `id` from the backing store, admits it and logs the miss, then
/// publishes the result through `guard`.
async fn fetch_and_admit(
    state: Arc<Mutex<CacheState>>,
    store: Arc<dyn BackingStore>,
    guard: LoadGuard,
    id: String,
) -> Result<Option<Item>> {
    info!("Cache miss for '{}', fetching from backing store", id);
    let fetched = match store.get_by_id(&id).await {
        Ok(fetched) => fetched,
        Err(err) => {
            warn!("Backing store fetch for '{}' failed: {}", id, err);
            let message = match &err {
                CacheError::Backing(message) => message.clone(),
                other => other.to_string(),
            };
            guard.complete(Err(message));
            return Err(err);
        }
    };

    let mut state = state.lock().await;
    let Some(item) = fetched else {
        let miss = state.event(EventKind::Miss, &id, id.as_str());
        state.record_batch(miss);
        guard.complete(Ok(None));
        return Ok(None);
    };

    match state.engine.put(id.as_str(), item.clone(), item.size_bytes, None) {
        // the read that missed counts as the first access
        Ok(_) => {
            state.engine.touch(&id);
        }
        Err(err) => warn!("Serving '{}' uncached: {}", id, err),
    }
    let miss = state.event(EventKind::Miss, &id, item.name.clone());
    state.record_batch(miss);
    guard.complete(Ok(Some(item.clone())));

    Ok(Some(item))
}

// == Orchestrator ==
pub struct Orchestrator {
    state: Arc<Mutex<CacheState>>,
    store: Arc<dyn BackingStore>,
    loading: LoadingSet,
    available: RwLock<Vec<ItemSummary>>,
    capacity_bytes: u64,
    stress_seq: AtomicU64,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("capacity_bytes", &self.capacity_bytes)
            .field("loading", &self.loading)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    // == Constructor ==
    /// Wraps `engine` in front of `store`. The available listing starts empty;
    /// call [`Orchestrator::refresh_available`] to sync it.
    pub fn new(engine: CacheEngine<Item>, store: Arc<dyn BackingStore>) -> Self {
        let capacity_bytes = engine.capacity();
        Self {
            state: Arc::new(Mutex::new(CacheState {
                engine,
                stats: StatsRecorder::new(),
                log: EventLog::new(),
            })),
            store,
            loading: LoadingSet::default(),
            available: RwLock::new(Vec::new()),
            capacity_bytes,
            stress_seq: AtomicU64::new(1),
        }
    }

    /// Like [`Orchestrator::new`], then syncs the available listing.
    pub async fn connect(
        engine: CacheEngine<Item>,
        store: Arc<dyn BackingStore>,
    ) -> Result<Self> {
        let orchestrator = Self::new(engine, store);
        orchestrator.refresh_available().await?;
        Ok(orchestrator)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity_bytes
    }

    // == Get ==
    /// Cache-aside read.
    ///
    /// Fresh entries are served from the cache. Otherwise the item is fetched
    /// from the backing store and admitted; concurrent reads of the same key
    /// share that one fetch. Unknown ids return a lookup with no item.
    ///
    /// The fetch runs on its own task, so it completes and the item is cached
    /// even if every caller waiting on it goes away.
    pub async fn get(&self, id: &str) -> Result<Lookup> {
        let claim = {
            let mut state = self.state.lock().await;
            if state.engine.has(id) {
                if let Some(item) = state.engine.get(id).cloned() {
                    let hit = state.event(EventKind::Hit, id, item.name.clone());
                    state.record_batch(hit);
                    debug!("Cache hit for '{}'", id);
                    return Ok(Lookup {
                        item: Some(item),
                        access: CacheAccess::Hit,
                        coalesced: false,
                    });
                }
            }
            state.flush();
            self.loading.claim(id)
        };

        let guard = match claim {
            Claim::Follower(follower) => {
                debug!("'{}' is already loading, waiting on the in-flight fetch", id);
                let item = follower.wait().await?;
                return Ok(Lookup {
                    item,
                    access: CacheAccess::Miss,
                    coalesced: true,
                });
            }
            Claim::Leader(guard) => guard,
        };

        let fetch = tokio::spawn(fetch_and_admit(
            Arc::clone(&self.state),
            Arc::clone(&self.store),
            guard,
            id.to_string(),
        ));
        let item = fetch.await.map_err(|err| {
            CacheError::Internal(format!("fetch task for '{}' failed: {}", id, err))
        })??;

        Ok(Lookup {
            item,
            access: CacheAccess::Miss,
            coalesced: false,
        })
    }

    // == Put ==
    /// Write-through create: persists `new` in the backing store, then admits
    /// the created item to the cache.
    ///
    /// Items without a size get a random one between 512 and 1536 bytes.
    /// Items larger than the cache are refused before the store is touched.
    pub async fn put(&self, mut new: NewItem) -> Result<Item> {
        let size = match new.size_bytes {
            Some(size) => size,
            None => rand::thread_rng().gen_range(MIN_RANDOM_ITEM_SIZE..=MAX_RANDOM_ITEM_SIZE),
        };
        if size > self.capacity_bytes {
            return Err(CacheError::ItemTooLarge {
                size,
                capacity: self.capacity_bytes,
            });
        }
        new.size_bytes = Some(size);

        let created = self.store.create(new).await?;

        {
            let mut state = self.state.lock().await;
            let evicted = state
                .engine
                .put(created.id.clone(), created.clone(), created.size_bytes, None)?;
            let add = state.event(EventKind::Add, &created.id, created.name.clone());
            state.record_batch(add);
            info!(
                "Added '{}' ({} bytes), evicted {} entries",
                created.id,
                created.size_bytes,
                evicted.len()
            );
        }

        self.available.write().await.push(ItemSummary::from(&created));
        Ok(created)
    }

    // == Update ==
    /// Write-through partial update.
    ///
    /// The merged item is written to the backing store and the cached copy,
    /// if any, is refreshed. When the store write fails but a cached copy
    /// exists, the patch is applied to the cache only and the outcome is
    /// marked degraded. Returns `Ok(None)` for unknown ids.
    pub async fn update(&self, id: &str, patch: ItemPatch) -> Result<Option<UpdateOutcome>> {
        let cached = {
            let mut state = self.state.lock().await;
            let cached = if state.engine.has(id) {
                state.engine.peek(id).map(|entry| entry.value.clone())
            } else {
                None
            };
            state.flush();
            cached
        };

        let mut merged = match cached {
            Some(item) => item,
            None => match self.store.get_by_id(id).await? {
                Some(item) => item,
                None => return Ok(None),
            },
        };
        patch.apply(&mut merged);

        let written = self.store.update(merged.clone()).await;

        let mut state = self.state.lock().await;
        let (patched, write_through) = match written {
            Ok(stored) => {
                let patched = state
                    .engine
                    .modify(id, |item| *item = stored.clone())
                    .cloned();
                (patched.unwrap_or(stored), WriteThrough::Committed)
            }
            Err(err) => match state.engine.modify(id, |item| patch.apply(item)).cloned() {
                Some(item) => {
                    warn!("Write-through for '{}' failed, cache-only update: {}", id, err);
                    (
                        item,
                        WriteThrough::Degraded {
                            reason: err.to_string(),
                        },
                    )
                }
                None => return Err(err),
            },
        };

        let cached = state.engine.peek(id).is_some();
        if cached {
            let update = state.event(EventKind::Update, id, patched.name.clone());
            state.record_batch(update);
        }
        Ok(Some(UpdateOutcome {
            item: patched,
            cached,
            write_through,
        }))
    }

    // == Delete ==
    /// Removes `id` from the cache. The backing store is untouched.
    ///
    /// Returns whether the key was cached; deleting twice is harmless.
    pub async fn delete(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let label = match state.engine.peek(id) {
            Some(entry) => entry.value.name.clone(),
            None => return false,
        };
        state.engine.delete(id);
        let delete = state.event(EventKind::Delete, id, label);
        state.record_batch(delete);
        true
    }

    // == Clear ==
    /// Empties the cache, the event log and the metrics, then re-syncs the
    /// available listing.
    pub async fn clear(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.engine.clear();
            state.engine.take_events();
            state.log.clear();
            state.stats.reset();
        }
        info!("Cache cleared");
        self.refresh_available().await?;
        Ok(())
    }

    /// Zeroes the metrics; cached entries and the event log are kept.
    pub async fn reset_metrics(&self) {
        self.state.lock().await.stats.reset();
    }

    /// Removes every expired entry and logs an `expired` event for each.
    pub async fn purge_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let purged = state.engine.purge_expired();
        state.flush();
        purged
    }

    // == Introspection ==
    pub async fn metrics(&self) -> Metrics {
        self.state.lock().await.stats.snapshot()
    }

    /// Recent events, newest first.
    pub async fn events(&self) -> Vec<CacheEvent> {
        self.state.lock().await.log.events()
    }

    /// Cached entries in insertion order.
    pub async fn cached_items(&self) -> Vec<CacheEntry<Item>> {
        let state = self.state.lock().await;
        state.engine.entries().cloned().collect()
    }

    pub async fn memory_usage(&self) -> MemoryUsage {
        let state = self.state.lock().await;
        MemoryUsage {
            used_bytes: state.engine.size(),
            capacity_bytes: state.engine.capacity(),
            item_count: state.engine.count(),
            usage: state.engine.memory_usage(),
        }
    }

    /// Items the backing store offers, as of the last sync.
    pub async fn available_items(&self) -> Vec<ItemSummary> {
        self.available.read().await.clone()
    }

    /// Re-reads the available listing from the backing store.
    pub async fn refresh_available(&self) -> Result<usize> {
        let listing = self.store.list_all().await?;
        let count = listing.len();
        *self.available.write().await = listing;
        Ok(count)
    }

    /// Keys with a backing-store fetch in flight.
    pub fn loading_keys(&self) -> Vec<String> {
        self.loading.loading_keys()
    }

    pub fn is_loading(&self, id: &str) -> bool {
        self.loading.is_loading(id)
    }
}
