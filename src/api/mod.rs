//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `GET /items` - Items available in the backing store
//! - `POST /items` - Create an item (write-through)
//! - `GET /items/:id` - Read an item (cache-aside)
//! - `PATCH /items/:id` - Update an item (write-through)
//! - `DELETE /items/:id` - Remove an item from the cache
//! - `GET /cache` - Cached entries and memory usage
//! - `POST /cache/clear` - Empty the cache, log and metrics
//! - `GET /metrics` - Hit/miss counters
//! - `POST /metrics/reset` - Zero the counters
//! - `GET /events` - Recent cache events
//! - `POST /stress` - Run a bulk fill (409 while one is running)
//! - `POST /stress/stop` - Stop a running bulk fill
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
