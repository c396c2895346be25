//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::cache::{CacheService, CacheStats};
use crate::error::Result;
use crate::models::{ClearResponse, HealthResponse, TtlResponse};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cache service; cloning shares the same store and counters
    pub cache: CacheService,
}

impl AppState {
    pub fn new(cache: CacheService) -> Self {
        Self { cache }
    }
}

/// Handler for DELETE /cache/:pattern
///
/// Evicts every key in the namespace matching the glob pattern.
pub async fn clear_handler(
    State(state): State<AppState>,
    Path(pattern): Path<String>,
) -> Result<Json<ClearResponse>> {
    let evicted = state.cache.clear_cache(&pattern).await?;
    info!(%pattern, evicted, "admin eviction");

    Ok(Json(ClearResponse::new(pattern, evicted)))
}

/// Handler for GET /ttl/:key
pub async fn ttl_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<TtlResponse>> {
    let ttl = state.cache.get_ttl(&key).await?;

    Ok(Json(TtlResponse::new(key, ttl)))
}

/// Handler for GET /stats
///
/// Returns hit/miss counters, latency table and store figures.
pub async fn stats_handler(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.cache_stats().await)
}

/// Handler for GET /health
///
/// Reports "degraded" while the store cannot be reached; the cache keeps
/// serving misses in that mode, so the endpoint still answers 200.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.cache.store_name();
    if state.cache.ping().await {
        Json(HealthResponse::healthy(store))
    } else {
        Json(HealthResponse::degraded(store))
    }
}
