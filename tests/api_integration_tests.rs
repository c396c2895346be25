//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each admin endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use cache_service::{
    create_router, AppState, CacheConfig, CacheService, Expiry, MemoryStore,
};
use serde_json::Value;
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app() -> (CacheService, Arc<MemoryStore>, Router) {
    let store = Arc::new(MemoryStore::new());
    let cache = CacheService::new(store.clone(), CacheConfig::default()).unwrap();
    let app = create_router(AppState::new(cache.clone()));
    (cache, store, app)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let (_, _, app) = create_test_app();

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["store"], "memory");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_health_endpoint_store_offline() {
    let (_, store, app) = create_test_app();
    store.set_offline(true);

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "degraded");
}

// == Stats Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint_initial() {
    let (_, _, app) = create_test_app();

    let response = app.oneshot(get("/stats")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["hit_count"], 0);
    assert_eq!(json["miss_count"], 0);
    assert_eq!(json["hit_rate"], 0.0);
    assert_eq!(json["total_keys"], 0);
}

#[tokio::test]
async fn test_stats_endpoint_reflects_traffic() {
    let (cache, _, app) = create_test_app();
    cache.set("a", &1u32, Expiry::Default).await.unwrap();
    cache.set("b", &2u32, Expiry::Default).await.unwrap();
    let _: Option<u32> = cache.get("a").await.unwrap();
    let _: Option<u32> = cache.get("a").await.unwrap();
    let _: Option<u32> = cache.get("a").await.unwrap();
    let _: Option<u32> = cache.get("zzz").await.unwrap();

    let response = app.oneshot(get("/stats")).await.unwrap();
    let json = body_to_json(response.into_body()).await;

    assert_eq!(json["hit_count"], 3);
    assert_eq!(json["miss_count"], 1);
    assert_eq!(json["hit_rate"], 0.75);
    assert_eq!(json["total_keys"], 2);
    assert!(json["latencies"]["get"]["count"].as_u64().unwrap() >= 4);
}

#[tokio::test]
async fn test_stats_endpoint_with_store_offline() {
    let (_, store, app) = create_test_app();
    store.set_offline(true);

    let response = app.oneshot(get("/stats")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert!(json["total_keys"].is_null());
    assert!(json["used_memory"].is_null());
}

// == Clear Endpoint Tests ==

#[tokio::test]
async fn test_clear_endpoint_evicts_matching_keys() {
    let (cache, _, app) = create_test_app();
    cache.set("user:1", "a", Expiry::Default).await.unwrap();
    cache.set("user:2", "b", Expiry::Default).await.unwrap();
    cache.set("order:1", "c", Expiry::Default).await.unwrap();

    let response = app.oneshot(delete("/cache/user:*")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["pattern"], "user:*");
    assert_eq!(json["evicted"], 2);
    assert!(cache.exists("order:1").await.unwrap());
}

#[tokio::test]
async fn test_clear_endpoint_store_offline() {
    let (_, store, app) = create_test_app();
    store.set_offline(true);

    let response = app.oneshot(delete("/cache/*")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("unavailable"));
}

// == TTL Endpoint Tests ==

#[tokio::test]
async fn test_ttl_endpoint_states() {
    let (cache, _, app) = create_test_app();
    cache.set("temp", "v", Duration::from_secs(120)).await.unwrap();
    cache.set("pinned", "v", Expiry::Never).await.unwrap();

    let response = app.clone().oneshot(get("/ttl/temp")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["state"], "expires");
    let ttl_ms = json["ttl_ms"].as_u64().unwrap();
    assert!(ttl_ms > 110_000 && ttl_ms <= 120_000);

    let response = app.clone().oneshot(get("/ttl/pinned")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["state"], "persistent");
    assert!(json.get("ttl_ms").is_none());

    let response = app.oneshot(get("/ttl/absent")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["state"], "missing");
}

#[tokio::test]
async fn test_ttl_endpoint_rejects_oversized_key() {
    let (_, _, app) = create_test_app();
    let uri = format!("/ttl/{}", "k".repeat(600));

    let response = app.oneshot(get(&uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("Invalid key"));
}

// == Routing Tests ==

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (_, _, app) = create_test_app();

    let response = app.oneshot(get("/nonexistent")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wrong_method_returns_405() {
    let (_, _, app) = create_test_app();

    let response = app.oneshot(get("/cache/user:*")).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
