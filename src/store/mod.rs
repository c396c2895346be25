//! Store Module
//!
//! The remote key-value store seen through the handful of native verbs the
//! cache service needs. Keys reaching this layer are already namespaced and
//! values are already encoded; backends only move bytes.

mod entry;
mod glob;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

pub use entry::{current_timestamp_ms, duration_ms, StoredEntry, StoredValue};
pub use glob::{escape_glob, glob_match};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

// == Key TTL ==
/// Remaining lifetime of a key as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist
    Missing,
    /// Key exists and never expires
    Persistent,
    /// Key exists and expires after the given duration
    Expires(Duration),
}

impl KeyTtl {
    /// Maps a Redis-style PTTL reply (-2 absent, -1 persistent).
    pub fn from_pttl(pttl: i64) -> Self {
        match pttl {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms if ms < 0 => KeyTtl::Missing,
            ms => KeyTtl::Expires(Duration::from_millis(ms as u64)),
        }
    }
}

// == Store Message ==
/// A message delivered on a pub/sub channel, in its wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Receiving side of a store subscription; closed when the subscription ends.
pub type MessageReceiver = mpsc::UnboundedReceiver<StoreMessage>;

// == KvStore Trait ==
/// Native operations of the underlying key-value store.
///
/// Every primitive is atomic per key at the store. `ttl: None` on a write
/// means the key never expires.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    // -- strings --
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;
    /// SET NX; returns false without writing when the key exists.
    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool>;
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    // -- keyspace --
    async fn del(&self, keys: &[String]) -> Result<u64>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
    /// Deletes `key` only if its value equals `expected`, as one atomic step.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool>;

    // -- hashes --
    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> Result<bool>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>>;
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64>;
    async fn hexists(&self, key: &str, field: &str) -> Result<bool>;
    async fn hlen(&self, key: &str) -> Result<u64>;

    // -- lists --
    async fn lpush(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64>;
    async fn rpush(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64>;
    async fn lpop(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn rpop(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Inclusive range; negative indexes count from the tail.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>>;
    async fn llen(&self, key: &str) -> Result<u64>;

    // -- sets --
    async fn sadd(&self, key: &str, members: Vec<Vec<u8>>) -> Result<u64>;
    async fn smembers(&self, key: &str) -> Result<Vec<Vec<u8>>>;
    async fn sismember(&self, key: &str, member: &[u8]) -> Result<bool>;
    async fn srem(&self, key: &str, members: Vec<Vec<u8>>) -> Result<u64>;
    async fn scard(&self, key: &str) -> Result<u64>;

    // -- sorted sets --
    async fn zadd(&self, key: &str, member: Vec<u8>, score: f64) -> Result<bool>;
    /// Members by rank, ascending score, inclusive range.
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>>;
    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<Vec<u8>>>;
    async fn zrem(&self, key: &str, member: &[u8]) -> Result<bool>;
    async fn zcard(&self, key: &str) -> Result<u64>;
    async fn zscore(&self, key: &str, member: &[u8]) -> Result<Option<f64>>;

    // -- messaging --
    /// Returns the number of subscribers the message reached.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<u64>;
    async fn subscribe(&self, channels: &[String]) -> Result<MessageReceiver>;

    // -- introspection --
    /// Round trip to the backend without touching data.
    async fn ping(&self) -> Result<()>;

    /// Memory used by the store in bytes, when the backend reports it.
    async fn used_memory(&self) -> Result<Option<u64>>;
}

/// Resolves Redis-style inclusive `[start, stop]` indexes against a length.
pub(crate) fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ttl_from_pttl() {
        assert_eq!(KeyTtl::from_pttl(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_pttl(-1), KeyTtl::Persistent);
        assert_eq!(
            KeyTtl::from_pttl(1500),
            KeyTtl::Expires(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 1, 2), Some((1, 2)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 3, 100), Some((3, 4)));
        assert_eq!(resolve_range(5, 4, 2), None);
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(5, 7, 9), None);
    }
}
