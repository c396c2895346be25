//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::store::{duration_ms, KeyTtl};

/// Response body for pattern eviction (DELETE /cache/:pattern)
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    /// Pattern as given, before namespacing
    pub pattern: String,
    /// Number of keys removed
    pub evicted: u64,
}

impl ClearResponse {
    pub fn new(pattern: impl Into<String>, evicted: u64) -> Self {
        Self {
            pattern: pattern.into(),
            evicted,
        }
    }
}

/// Response body for TTL inspection (GET /ttl/:key)
#[derive(Debug, Clone, Serialize)]
pub struct TtlResponse {
    pub key: String,
    /// One of "missing", "persistent", "expires"
    pub state: &'static str,
    /// Remaining lifetime, present only when the key expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

impl TtlResponse {
    pub fn new(key: impl Into<String>, ttl: KeyTtl) -> Self {
        let (state, ttl_ms) = match ttl {
            KeyTtl::Missing => ("missing", None),
            KeyTtl::Persistent => ("persistent", None),
            KeyTtl::Expires(remaining) => ("expires", Some(duration_ms(remaining))),
        };
        Self {
            key: key.into(),
            state,
            ttl_ms,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Backend serving the cache
    pub store: &'static str,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(store: &'static str) -> Self {
        Self::with_status("healthy", store)
    }

    /// Store unreachable; reads are served as misses
    pub fn degraded(store: &'static str) -> Self {
        Self::with_status("degraded", store)
    }

    fn with_status(status: &str, store: &'static str) -> Self {
        Self {
            status: status.to_string(),
            store,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clear_response_serialize() {
        let resp = ClearResponse::new("user:*", 3);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["pattern"], "user:*");
        assert_eq!(json["evicted"], 3);
    }

    #[test]
    fn test_ttl_response_states() {
        let json = serde_json::to_value(TtlResponse::new("a", KeyTtl::Missing)).unwrap();
        assert_eq!(json["state"], "missing");
        assert!(json.get("ttl_ms").is_none());

        let json = serde_json::to_value(TtlResponse::new("a", KeyTtl::Persistent)).unwrap();
        assert_eq!(json["state"], "persistent");

        let resp = TtlResponse::new("a", KeyTtl::Expires(Duration::from_millis(1500)));
        assert_eq!(resp.state, "expires");
        assert_eq!(resp.ttl_ms, Some(1500));
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy("memory");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("memory"));
        assert!(json.contains("timestamp"));
    }
}
