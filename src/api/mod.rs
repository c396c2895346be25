//! API Module
//!
//! HTTP handlers and routing for the cache administration API.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Cache statistics
//! - `DELETE /cache/:pattern` - Evict keys matching a pattern
//! - `GET /ttl/:key` - Inspect a key's remaining lifetime

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
