//! Cache Administration
//!
//! Low-frequency operations: pattern eviction, warm-up and statistics.

use std::fmt::Display;
use std::future::Future;

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{CacheService, CacheStats, Expiry};
use crate::error::{CacheError, Result};
use crate::store::escape_glob;

impl CacheService {
    // == Clear Cache ==
    /// Deletes every key matching the glob `pattern` within the namespace.
    ///
    /// Scans the keyspace; not meant for hot-path invalidation.
    ///
    /// # Returns
    /// Number of keys evicted
    pub async fn clear_cache(&self, pattern: &str) -> Result<u64> {
        let scoped = self.inner.keys.build_pattern(pattern)?;
        let keys = self.call("keys", self.inner.store.keys(&scoped)).await?;
        if keys.is_empty() {
            info!(pattern = %scoped, "clear_cache matched no keys");
            return Ok(0);
        }
        let evicted = self.call("del", self.inner.store.del(&keys)).await?;
        info!(pattern = %scoped, evicted, "cache cleared");
        Ok(evicted)
    }

    // == Warm Up ==
    /// Runs `loader` and writes its entries with the default TTL.
    ///
    /// Individual write failures are logged and skipped. A failing loader
    /// writes nothing and is reported as `Loader`.
    ///
    /// # Returns
    /// Number of entries written
    pub async fn warm_up_cache<F, Fut, I, K, V, E>(&self, loader: F) -> Result<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<I, E>>,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
        E: Display,
    {
        let entries = loader().await.map_err(|err| {
            warn!(error = %err, "cache warm-up loader failed");
            CacheError::Loader(err.to_string())
        })?;
        let written = self.multi_set(entries, Expiry::Default).await;
        info!(written, "cache warm-up finished");
        Ok(written)
    }

    // == Statistics ==
    /// Current hit/miss figures plus key count and store memory.
    ///
    /// Store figures are `None` when the store cannot be reached; the
    /// counters are always available.
    pub async fn cache_stats(&self) -> CacheStats {
        let snapshot = self.inner.metrics.snapshot();
        let pattern = format!("{}*", escape_glob(self.inner.keys.prefix()));

        let total_keys = match self.call("keys", self.inner.store.keys(&pattern)).await {
            Ok(keys) => Some(keys.len() as u64),
            Err(err) => {
                warn!(error = %err, "could not count cache keys");
                None
            }
        };
        let used_memory = match self.call("info", self.inner.store.used_memory()).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "could not read store memory");
                None
            }
        };

        CacheStats::new(snapshot, total_keys, used_memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::config::CacheConfig;
    use crate::store::{KvStore, MemoryStore};

    fn service() -> (Arc<MemoryStore>, CacheService) {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheService::new(store.clone(), CacheConfig::default()).unwrap();
        (store, cache)
    }

    #[tokio::test]
    async fn test_glob_characters_in_prefix_are_literal() {
        let store = Arc::new(MemoryStore::new());
        let config = CacheConfig {
            key_prefix: "t*:".to_string(),
            ..CacheConfig::default()
        };
        let cache = CacheService::new(store.clone(), config).unwrap();
        cache.set("a", "mine", Expiry::Default).await.unwrap();
        store.set("tenant:a", b"other".to_vec(), None).await.unwrap();

        assert_eq!(cache.cache_stats().await.total_keys, Some(1));
        assert_eq!(cache.clear_cache("*").await.unwrap(), 1);
        assert!(store.exists("tenant:a").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_cache_matches_pattern_in_namespace() {
        let (store, cache) = service();
        cache.set("user:1", "a", Expiry::Default).await.unwrap();
        cache.set("user:2", "b", Expiry::Default).await.unwrap();
        cache.set("order:1", "c", Expiry::Default).await.unwrap();
        store.set("user:3", b"outside".to_vec(), None).await.unwrap();

        assert_eq!(cache.clear_cache("user:*").await.unwrap(), 2);
        assert!(cache.exists("order:1").await.unwrap());
        assert!(store.exists("user:3").await.unwrap());
        assert_eq!(cache.clear_cache("user:*").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_cache_offline_is_an_error() {
        let (store, cache) = service();
        store.set_offline(true);
        assert!(cache.clear_cache("*").await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_warm_up_writes_entries() {
        let (_, cache) = service();
        let written = cache
            .warm_up_cache(|| async {
                let mut entries = HashMap::new();
                entries.insert("config:a".to_string(), 1u32);
                entries.insert("config:b".to_string(), 2u32);
                Ok::<_, std::io::Error>(entries)
            })
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(cache.get::<u32>("config:b").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_warm_up_loader_failure() {
        let (store, cache) = service();
        let result = cache
            .warm_up_cache(|| async { Err::<Vec<(String, u32)>, _>("database down") })
            .await;

        assert!(matches!(result, Err(CacheError::Loader(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_stats_report_counters_and_store() {
        let (_, cache) = service();
        cache.set("a", "1", Expiry::Default).await.unwrap();
        let _: Option<String> = cache.get("a").await.unwrap();
        let _: Option<String> = cache.get("b").await.unwrap();

        let stats = cache.cache_stats().await;
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_rate, 0.5);
        assert_eq!(stats.total_keys, Some(1));
        assert!(stats.used_memory.is_some());
        assert!(stats.latencies.contains_key("set"));
    }

    #[tokio::test]
    async fn test_stats_without_store() {
        let (store, cache) = service();
        store.set_offline(true);

        let stats = cache.cache_stats().await;
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.total_keys, None);
        assert_eq!(stats.used_memory, None);
    }
}
