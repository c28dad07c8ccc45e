//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::store::{ItemPatch, NewItem};

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 100;
pub const MIN_PRICE: f64 = 0.01;
pub const MAX_PRICE: f64 = 1_000_000.0;
pub const MAX_STOCK: u32 = 10_000;

fn check_name(name: &str) -> Option<String> {
    let len = name.trim().chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Some(format!(
            "Name must be between {} and {} characters",
            MIN_NAME_LEN, MAX_NAME_LEN
        ));
    }
    None
}

fn check_price(price: f64) -> Option<String> {
    if !price.is_finite() || !(MIN_PRICE..=MAX_PRICE).contains(&price) {
        return Some(format!(
            "Price must be between {} and {}",
            MIN_PRICE, MAX_PRICE
        ));
    }
    None
}

fn check_category(category: &str) -> Option<String> {
    if category.trim().is_empty() {
        return Some("Category cannot be empty".to_string());
    }
    None
}

fn check_stock(stock: u32) -> Option<String> {
    if stock > MAX_STOCK {
        return Some(format!("Stock cannot exceed {}", MAX_STOCK));
    }
    None
}

/// Request body for POST /items
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    pub name: String,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub stock: u32,
    /// Cached size in bytes; picked at random when absent
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl CreateItemRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if let Some(err) = check_name(&self.name) {
            return Some(err);
        }
        if let Some(err) = check_price(self.price) {
            return Some(err);
        }
        if let Some(err) = check_category(&self.category) {
            return Some(err);
        }
        if let Some(err) = check_stock(self.stock) {
            return Some(err);
        }
        if self.size_bytes == Some(0) {
            return Some("Size must be greater than zero".to_string());
        }
        None
    }
}

impl From<CreateItemRequest> for NewItem {
    fn from(req: CreateItemRequest) -> Self {
        Self {
            name: req.name.trim().to_string(),
            price: req.price,
            category: req.category.trim().to_string(),
            stock: req.stock,
            size_bytes: req.size_bytes,
        }
    }
}

/// Request body for PATCH /items/:id
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub stock: Option<u32>,
}

impl UpdateItemRequest {
    /// Validates the present fields; at least one is required.
    pub fn validate(&self) -> Option<String> {
        let checks = [
            self.name.as_deref().and_then(check_name),
            self.price.and_then(check_price),
            self.category.as_deref().and_then(check_category),
            self.stock.and_then(check_stock),
        ];
        if let Some(err) = checks.into_iter().flatten().next() {
            return Some(err);
        }

        let patch = ItemPatch::from(self.clone());
        if patch.is_empty() {
            return Some("At least one field must be provided".to_string());
        }
        None
    }
}

impl From<UpdateItemRequest> for ItemPatch {
    fn from(req: UpdateItemRequest) -> Self {
        Self {
            name: req.name.map(|name| name.trim().to_string()),
            price: req.price,
            category: req.category.map(|category| category.trim().to_string()),
            stock: req.stock,
        }
    }
}
