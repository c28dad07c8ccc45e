//! Backing Store Module
//!
//! The authoritative data source the cache fronts, plus the item types that
//! flow between it and the cache.

mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::Labeled;
use crate::error::Result;

pub use memory::{catalog, InMemoryStore, DEFAULT_ITEM_SIZE};

// == Item ==
/// A catalog record as held by the backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub category: String,
    pub stock: u32,
    /// Bytes the item occupies once cached
    pub size_bytes: u64,
}

impl Labeled for Item {
    fn label(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

// == Item Summary ==
/// Listing row for items available to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: String,
    pub name: String,
}

impl From<&Item> for ItemSummary {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
        }
    }
}

// == New Item ==
/// Fields for an item that has no id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub name: String,
    pub price: f64,
    pub category: String,
    pub stock: u32,
    /// Cached size; chosen on admission when absent
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

// == Item Patch ==
/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub stock: Option<u32>,
}

impl ItemPatch {
    /// Merges the present fields into `item`.
    pub fn apply(&self, item: &mut Item) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(price) = self.price {
            item.price = price;
        }
        if let Some(category) = &self.category {
            item.category = category.clone();
        }
        if let Some(stock) = self.stock {
            item.stock = stock;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.category.is_none()
            && self.stock.is_none()
    }
}

// == Backing Store Trait ==
/// Authoritative item storage.
///
/// Implementations must be thread-safe; every call may suspend.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Summaries of every item, in store order
    async fn list_all(&self) -> Result<Vec<ItemSummary>>;

    /// Looks up one item; `Ok(None)` when the id is unknown
    async fn get_by_id(&self, id: &str) -> Result<Option<Item>>;

    /// Persists a new item and returns it with its assigned id
    async fn create(&self, item: NewItem) -> Result<Item>;

    /// Replaces an existing item
    async fn update(&self, item: Item) -> Result<Item>;
}
