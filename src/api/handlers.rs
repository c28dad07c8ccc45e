//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::cache::{CacheEngine, Metrics};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    CacheResponse, CreateItemRequest, DeleteResponse, EventsResponse, HealthResponse,
    ItemResponse, ItemsResponse, MessageResponse, UpdateItemRequest,
};
use crate::orchestrator::{
    BulkFillOptions, BulkFillReport, FillControl, Orchestrator, UpdateOutcome,
};
use crate::store::{InMemoryStore, Item};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Admits and stops bulk fills
    pub fill: FillControl,
}

impl AppState {
    /// Creates a new AppState around `orchestrator`.
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            fill: FillControl::new(),
        }
    }

    /// Builds the engine and the demo backing store from the Config and
    /// syncs the available listing.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let engine = CacheEngine::new(config.capacity_bytes, config.engine_options())?;
        let store = InMemoryStore::with_catalog().with_latency(config.backing_latency());
        let orchestrator = Orchestrator::connect(engine, Arc::new(store)).await?;
        Ok(Self::new(orchestrator))
    }
}

/// Handler for GET /items
///
/// Lists the items the backing store offers.
pub async fn list_items_handler(State(state): State<AppState>) -> Json<ItemsResponse> {
    Json(ItemsResponse {
        items: state.orchestrator.available_items().await,
    })
}

/// Handler for POST /items
///
/// Creates an item in the backing store and caches it.
pub async fn create_item_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<Item>)> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let item = state.orchestrator.put(req.into()).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Handler for GET /items/:id
///
/// Cache-aside read; the response says whether the cache served it.
pub async fn get_item_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ItemResponse>> {
    let lookup = state.orchestrator.get(&id).await?;
    let item = lookup.item.ok_or(CacheError::NotFound(id))?;

    Ok(Json(ItemResponse {
        item,
        source: lookup.access,
        coalesced: lookup.coalesced,
    }))
}

/// Handler for PATCH /items/:id
///
/// Write-through update of the present fields.
pub async fn update_item_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<UpdateOutcome>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let outcome = state
        .orchestrator
        .update(&id, req.into())
        .await?
        .ok_or(CacheError::NotFound(id))?;
    Ok(Json(outcome))
}

/// Handler for DELETE /items/:id
///
/// Removes the item from the cache only.
pub async fn delete_item_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<DeleteResponse> {
    let removed = state.orchestrator.delete(&id).await;
    Json(DeleteResponse::new(id, removed))
}

/// Handler for GET /cache
pub async fn cache_handler(State(state): State<AppState>) -> Json<CacheResponse> {
    let orchestrator = &state.orchestrator;
    Json(CacheResponse {
        entries: orchestrator.cached_items().await,
        usage: orchestrator.memory_usage().await,
        loading: orchestrator.loading_keys(),
    })
}

/// Handler for POST /cache/clear
pub async fn clear_cache_handler(State(state): State<AppState>) -> Result<Json<MessageResponse>> {
    state.orchestrator.clear().await?;
    Ok(Json(MessageResponse::new("Cache cleared")))
}

/// Handler for GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<Metrics> {
    Json(state.orchestrator.metrics().await)
}

/// Handler for POST /metrics/reset
pub async fn reset_metrics_handler(State(state): State<AppState>) -> Json<Metrics> {
    state.orchestrator.reset_metrics().await;
    Json(state.orchestrator.metrics().await)
}

/// Handler for GET /events
pub async fn events_handler(State(state): State<AppState>) -> Json<EventsResponse> {
    Json(EventsResponse {
        events: state.orchestrator.events().await,
    })
}

/// Handler for POST /stress
///
/// Runs a bulk fill to completion or until POST /stress/stop. The body is
/// optional; missing fields take their defaults. Answers 409 while another
/// fill is running.
pub async fn stress_handler(
    State(state): State<AppState>,
    options: Option<Json<BulkFillOptions>>,
) -> Result<Json<BulkFillReport>> {
    let options = options.map(|Json(options)| options).unwrap_or_default();

    let run = state.fill.begin()?;
    let report = state.orchestrator.bulk_fill(&options, run.signal()).await?;
    Ok(Json(report))
}

/// Handler for POST /stress/stop
pub async fn stop_stress_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.fill.stop();
    info!("Bulk fill stop requested");
    Json(MessageResponse::new("Stop requested"))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
