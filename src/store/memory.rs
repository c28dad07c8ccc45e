//! In-Memory Backing Store
//!
//! Vector-backed store with simulated latency and failure injection, used by
//! the demo server and by tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{BackingStore, Item, ItemSummary, NewItem};
use crate::error::{CacheError, Result};

/// Size used for created items that arrive without one.
pub const DEFAULT_ITEM_SIZE: u64 = 1024;

// == In-Memory Store ==
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: RwLock<Vec<Item>>,
    latency: Duration,
    next_id: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fetches: AtomicUsize,
}

impl InMemoryStore {
    // == Constructor ==
    /// Creates an empty store with no latency.
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Creates a store holding `items`; new ids continue after them.
    pub fn with_items(items: Vec<Item>) -> Self {
        let next_id = items.len() as u64 + 1;
        Self {
            items: RwLock::new(items),
            next_id: AtomicU64::new(next_id),
            ..Self::default()
        }
    }

    /// Creates a store seeded with the demo catalog.
    pub fn with_catalog() -> Self {
        Self::with_items(catalog())
    }

    /// Every call sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes `get_by_id` and `list_all` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes `create` and `update` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `get_by_id` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Backing(format!("{} unavailable", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn list_all(&self) -> Result<Vec<ItemSummary>> {
        self.simulate_latency().await;
        self.check(&self.fail_reads, "list")?;

        let items = self.items.read().await;
        Ok(items.iter().map(ItemSummary::from).collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Item>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check(&self.fail_reads, "read")?;

        let items = self.items.read().await;
        Ok(items.iter().find(|item| item.id == id).cloned())
    }

    async fn create(&self, item: NewItem) -> Result<Item> {
        self.simulate_latency().await;
        self.check(&self.fail_writes, "write")?;

        let id = format!("p{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let created = Item {
            id,
            name: item.name,
            price: item.price,
            category: item.category,
            stock: item.stock,
            size_bytes: item.size_bytes.unwrap_or(DEFAULT_ITEM_SIZE),
        };

        self.items.write().await.push(created.clone());
        debug!("Backing store created '{}'", created.id);
        Ok(created)
    }

    async fn update(&self, item: Item) -> Result<Item> {
        self.simulate_latency().await;
        self.check(&self.fail_writes, "write")?;

        let mut items = self.items.write().await;
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(item)
            }
            None => Err(CacheError::NotFound(item.id)),
        }
    }
}

// == Demo Catalog ==
/// The ten items the demo store starts with.
pub fn catalog() -> Vec<Item> {
    let rows: [(&str, &str, f64, &str, u32, u64); 10] = [
        ("p1", "MacBook Pro 16\"", 2499.0, "Electronics", 15, 2048),
        ("p2", "iPhone 15 Pro", 1199.0, "Electronics", 50, 1536),
        ("p3", "Sony WH-1000XM5", 399.0, "Audio", 30, 1024),
        ("p4", "iPad Air", 799.0, "Electronics", 25, 1792),
        ("p5", "AirPods Pro", 249.0, "Audio", 100, 768),
        ("p6", "Samsung Galaxy S24", 999.0, "Electronics", 40, 1536),
        ("p7", "Dell XPS 15", 1799.0, "Electronics", 20, 2048),
        ("p8", "Bose QC45", 329.0, "Audio", 35, 1024),
        ("p9", "Apple Watch Ultra", 799.0, "Wearables", 18, 1280),
        ("p10", "Nintendo Switch OLED", 349.0, "Gaming", 45, 1536),
    ];

    rows.into_iter()
        .map(|(id, name, price, category, stock, size_bytes)| Item {
            id: id.to_string(),
            name: name.to_string(),
            price,
            category: category.to_string(),
            stock,
            size_bytes,
        })
        .collect()
}
