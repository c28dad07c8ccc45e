//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cache_handler, clear_cache_handler, create_item_handler, delete_item_handler, events_handler,
    get_item_handler, health_handler, list_items_handler, metrics_handler, reset_metrics_handler,
    stop_stress_handler, stress_handler, update_item_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/items", get(list_items_handler).post(create_item_handler))
        .route(
            "/items/:id",
            get(get_item_handler)
                .patch(update_item_handler)
                .delete(delete_item_handler),
        )
        .route("/cache", get(cache_handler))
        .route("/cache/clear", post(clear_cache_handler))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/reset", post(reset_metrics_handler))
        .route("/events", get(events_handler))
        .route("/stress", post(stress_handler))
        .route("/stress/stop", post(stop_stress_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
