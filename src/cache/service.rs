//! Cache Service Module
//!
//! Typed cache operations over a [`KvStore`]. Every call passes through the
//! key policy and value codec and is bounded by the operation timeout.
//!
//! Read paths never fail because of the store: unreachable stores, timeouts
//! and undecodable payloads all surface as misses. Write paths report store
//! failures so callers never assume a write landed when it did not.

use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{AtomicMetrics, Expiry, KeyPolicy, MetricsRecorder, ValueCodec};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::store::{KeyTtl, KvStore};

// == Cache Service ==
/// Handle to the cache; cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct CacheService {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) keys: KeyPolicy,
    pub(crate) codec: ValueCodec,
    pub(crate) config: CacheConfig,
    pub(crate) metrics: Arc<dyn MetricsRecorder>,
    /// Delivery tasks of live subscriptions, by subscription id
    pub(crate) subscriptions: Mutex<std::collections::HashMap<u64, JoinHandle<()>>>,
    pub(crate) next_subscription: AtomicU64,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("store", &self.inner.store.name())
            .field("prefix", &self.inner.keys.prefix())
            .finish()
    }
}

impl CacheService {
    // == Constructor ==
    /// Creates a service with the default in-process metrics recorder.
    pub fn new(store: Arc<dyn KvStore>, config: CacheConfig) -> Result<Self> {
        Self::with_metrics(store, config, Arc::new(AtomicMetrics::new()))
    }

    /// Creates a service reporting to the given metrics recorder.
    pub fn with_metrics(
        store: Arc<dyn KvStore>,
        config: CacheConfig,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                keys: KeyPolicy::new(config.key_prefix.clone(), config.max_key_length),
                codec: ValueCodec::from_config(&config),
                store,
                config,
                metrics,
                subscriptions: Mutex::new(std::collections::HashMap::new()),
                next_subscription: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.inner.codec
    }

    pub fn key_policy(&self) -> &KeyPolicy {
        &self.inner.keys
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsRecorder> {
        &self.inner.metrics
    }

    /// Name of the backing store, for logs and health reports.
    pub fn store_name(&self) -> &'static str {
        self.inner.store.name()
    }

    /// True when the store answers within the operation timeout.
    pub async fn ping(&self) -> bool {
        match self.call("ping", self.inner.store.ping()).await {
            Ok(()) => true,
            Err(err) => {
                warn!(store = self.store_name(), error = %err, "store ping failed");
                false
            }
        }
    }

    // == Internal Helpers ==
    /// Runs one store round trip under the operation timeout and records
    /// its latency. Timeouts become `StoreUnavailable`; nothing is retried.
    pub(crate) async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let timeout = self.inner.config.operation_timeout;
        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::StoreUnavailable(format!(
                "{} timed out after {:?}",
                op, timeout
            ))),
        };
        self.inner.metrics.record_latency(op, started.elapsed());
        if result.is_err() {
            self.inner.metrics.record_error(op);
        }
        result
    }

    pub(crate) fn resolve_ttl(&self, expiry: Expiry) -> Result<Option<Duration>> {
        expiry.resolve(self.inner.config.default_ttl, self.inner.config.max_ttl)
    }

    /// Decodes a payload; failures are logged and reported as `None`.
    pub(crate) fn decode_or_log<T: DeserializeOwned>(&self, key: &str, wire: &[u8]) -> Option<T> {
        match self.inner.codec.decode(wire) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "discarding undecodable cache payload");
                self.inner.metrics.record_error("decode");
                None
            }
        }
    }

    /// Reads and decodes a store key without touching hit/miss counters.
    pub(crate) async fn lookup<T: DeserializeOwned>(&self, store_key: &str) -> Option<T> {
        match self.call("get", self.inner.store.get(store_key)).await {
            Ok(Some(wire)) => self.decode_or_log(store_key, &wire),
            Ok(None) => None,
            Err(err) => {
                warn!(key = store_key, error = %err, "cache read degraded to miss");
                None
            }
        }
    }

    // == Set ==
    /// Stores `value` under `key`, overwriting any previous value.
    ///
    /// Returns `Ok(false)` when the value could not be encoded: the write is
    /// skipped and recorded instead of failing the caller.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: impl Into<Expiry>) -> Result<bool>
    where
        T: Serialize + ?Sized,
    {
        let store_key = self.inner.keys.build_key(key)?;
        let ttl = self.resolve_ttl(ttl.into())?;
        let Some(wire) = self.encode_or_log(&store_key, value) else {
            return Ok(false);
        };
        self.call("set", self.inner.store.set(&store_key, wire, ttl))
            .await?;
        debug!(key = %store_key, ?ttl, "cache set");
        Ok(true)
    }

    // == Set If Absent ==
    /// Atomically stores `value` only if `key` does not exist.
    ///
    /// Returns true when this call wrote the value.
    pub async fn set_if_absent<T>(&self, key: &str, value: &T, ttl: impl Into<Expiry>) -> Result<bool>
    where
        T: Serialize + ?Sized,
    {
        let store_key = self.inner.keys.build_key(key)?;
        let ttl = self.resolve_ttl(ttl.into())?;
        let Some(wire) = self.encode_or_log(&store_key, value) else {
            return Ok(false);
        };
        self.call("set_nx", self.inner.store.set_nx(&store_key, wire, ttl))
            .await
    }

    fn encode_or_log<T: Serialize + ?Sized>(&self, store_key: &str, value: &T) -> Option<Vec<u8>> {
        match self.inner.codec.encode(value) {
            Ok(wire) => Some(wire),
            Err(err) => {
                warn!(key = store_key, error = %err, "skipping cache write");
                self.inner.metrics.record_error("encode");
                None
            }
        }
    }

    // == Get ==
    /// Returns the cached value for `key`, or `None` on a miss.
    ///
    /// Absent keys, undecodable payloads and store failures all count as
    /// misses. Only an invalid key is reported as an error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let store_key = self.inner.keys.build_key(key)?;
        let value = self.lookup(&store_key).await;
        self.record_lookup(value.is_some());
        Ok(value)
    }

    pub(crate) fn record_lookup(&self, hit: bool) {
        if hit {
            self.inner.metrics.record_hit();
        } else {
            self.inner.metrics.record_miss();
        }
    }

    // == Get Or Default ==
    /// Returns the cached value or `default`; never fails.
    pub async fn get_or_default<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                warn!(key, error = %err, "returning default");
                default
            }
        }
    }

    // == Delete ==
    /// Removes `key`; returns true if it existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let store_key = self.inner.keys.build_key(key)?;
        let removed = self.call("del", self.inner.store.del(&[store_key])).await?;
        Ok(removed > 0)
    }

    /// Removes all `keys` in one round trip; returns how many existed.
    pub async fn multi_delete<K: AsRef<str>>(&self, keys: &[K]) -> Result<u64> {
        let store_keys = self.build_keys(keys)?;
        if store_keys.is_empty() {
            return Ok(0);
        }
        self.call("del", self.inner.store.del(&store_keys)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let store_key = self.inner.keys.build_key(key)?;
        self.call("exists", self.inner.store.exists(&store_key)).await
    }

    /// Sets a new TTL on an existing key; false if the key is absent.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let store_key = self.inner.keys.build_key(key)?;
        let ttl = self
            .resolve_ttl(Expiry::After(ttl))?
            .unwrap_or(self.inner.config.max_ttl);
        self.call("expire", self.inner.store.expire(&store_key, ttl))
            .await
    }

    /// Remaining lifetime; distinguishes absent keys from persistent ones.
    pub async fn get_ttl(&self, key: &str) -> Result<KeyTtl> {
        let store_key = self.inner.keys.build_key(key)?;
        self.call("ttl", self.inner.store.ttl(&store_key)).await
    }

    /// Atomically adds `delta` to an integer value, creating it at 0.
    pub async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let store_key = self.inner.keys.build_key(key)?;
        self.call("incr", self.inner.store.incr_by(&store_key, delta))
            .await
    }

    // == Batch Operations ==
    /// Writes every entry with the same TTL; returns how many were written.
    ///
    /// A failing entry is logged and does not stop the rest.
    pub async fn multi_set<K, V, I>(&self, entries: I, ttl: impl Into<Expiry>) -> u64
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        let ttl = ttl.into();
        let mut written = 0;
        for (key, value) in entries {
            match self.set(key.as_ref(), &value, ttl).await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(err) => warn!(key = key.as_ref(), error = %err, "multi_set entry failed"),
            }
        }
        written
    }

    /// Reads all `keys` in one round trip, preserving input order.
    ///
    /// Each entry counts as a hit or miss. If the store is unreachable every
    /// entry is a miss.
    pub async fn multi_get<T, K>(&self, keys: &[K]) -> Result<Vec<(String, Option<T>)>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        let store_keys = self.build_keys(keys)?;
        if store_keys.is_empty() {
            return Ok(Vec::new());
        }
        let wires = match self.call("mget", self.inner.store.mget(&store_keys)).await {
            Ok(wires) => wires,
            Err(err) => {
                warn!(error = %err, "multi_get degraded to misses");
                vec![None; store_keys.len()]
            }
        };

        let results = keys
            .iter()
            .zip(store_keys.iter())
            .zip(wires)
            .map(|((key, store_key), wire)| {
                let value = wire.and_then(|w| self.decode_or_log::<T>(store_key, &w));
                self.record_lookup(value.is_some());
                (key.as_ref().to_string(), value)
            })
            .collect();
        Ok(results)
    }

    pub(crate) fn build_keys<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<String>> {
        keys.iter()
            .map(|key| self.inner.keys.build_key(key.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
    }

    fn service() -> (Arc<MemoryStore>, CacheService) {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheService::new(store.clone(), CacheConfig::default()).unwrap();
        (store, cache)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (_, cache) = service();
        let user = User { name: "Ann".into() };

        assert!(cache.set("user:1", &user, Expiry::Default).await.unwrap());
        let cached: Option<User> = cache.get("user:1").await.unwrap();
        assert_eq!(cached, Some(user));
    }

    #[tokio::test]
    async fn test_keys_are_prefixed_in_store() {
        let (store, cache) = service();
        cache.set("k", "v", Expiry::Default).await.unwrap();

        assert_eq!(store.get("cache:k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_records_hits_and_misses() {
        let (_, cache) = service();
        cache.set("k", &1u32, Expiry::Default).await.unwrap();

        let _: Option<u32> = cache.get("k").await.unwrap();
        let _: Option<u32> = cache.get("absent").await.unwrap();

        let snapshot = cache.metrics().snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert!(snapshot.latencies.contains_key("get"));
    }

    #[tokio::test]
    async fn test_decode_failure_is_a_miss() {
        let (store, cache) = service();
        store
            .set("cache:bad", b"{broken".to_vec(), None)
            .await
            .unwrap();

        let value: Option<User> = cache.get("bad").await.unwrap();
        assert!(value.is_none());
        assert_eq!(cache.metrics().snapshot().misses, 1);
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected() {
        let (_, cache) = service();
        assert!(matches!(
            cache.set("", "v", Expiry::Default).await,
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            cache.get::<String>("").await,
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_unencodable_value_is_skipped() {
        let (store, cache) = service();
        let mut bad = std::collections::HashMap::new();
        bad.insert((1, 2), "tuple keys are not JSON");

        assert!(!cache.set("bad", &bad, Expiry::Default).await.unwrap());
        assert!(store.is_empty().await);
        assert_eq!(cache.metrics().snapshot().errors, 1);
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let (_, cache) = service();

        assert!(cache.set_if_absent("once", "first", Expiry::Never).await.unwrap());
        assert!(!cache.set_if_absent("once", "second", Expiry::Never).await.unwrap());
        assert_eq!(
            cache.get::<String>("once").await.unwrap(),
            Some("first".to_string())
        );
    }

    #[tokio::test]
    async fn test_default_ttl_applied() {
        let (_, cache) = service();
        cache.set("k", "v", Expiry::Default).await.unwrap();

        match cache.get_ttl("k").await.unwrap() {
            KeyTtl::Expires(ttl) => assert!(ttl > Duration::from_secs(3590)),
            other => panic!("expected default expiry, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_never_expiry_and_missing_are_distinct() {
        let (_, cache) = service();
        cache.set("forever", "v", Expiry::Never).await.unwrap();

        assert_eq!(cache.get_ttl("forever").await.unwrap(), KeyTtl::Persistent);
        assert_eq!(cache.get_ttl("absent").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_delete_exists_expire() {
        let (_, cache) = service();
        cache.set("k", "v", Expiry::Never).await.unwrap();

        assert!(cache.exists("k").await.unwrap());
        assert!(cache.expire("k", Duration::from_secs(30)).await.unwrap());
        assert!(matches!(cache.get_ttl("k").await.unwrap(), KeyTtl::Expires(_)));

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert!(!cache.exists("k").await.unwrap());
        assert!(!cache.expire("k", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn test_increment() {
        let (_, cache) = service();
        assert_eq!(cache.increment("visits", 1).await.unwrap(), 1);
        assert_eq!(cache.increment("visits", 10).await.unwrap(), 11);
        assert_eq!(cache.get::<i64>("visits").await.unwrap(), Some(11));
    }

    #[tokio::test]
    async fn test_multi_set_and_get_preserve_order() {
        let (_, cache) = service();
        let written = cache
            .multi_set(vec![("b", 2u32), ("a", 1u32), ("c", 3u32)], Expiry::Default)
            .await;
        assert_eq!(written, 3);

        let values: Vec<(String, Option<u32>)> =
            cache.multi_get(&["c", "missing", "a"]).await.unwrap();
        assert_eq!(
            values,
            vec![
                ("c".to_string(), Some(3)),
                ("missing".to_string(), None),
                ("a".to_string(), Some(1)),
            ]
        );

        let snapshot = cache.metrics().snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
    }

    #[tokio::test]
    async fn test_multi_set_counts_partial_success() {
        let (_, cache) = service();
        let written = cache
            .multi_set(vec![("ok", 1u32), ("", 2u32), ("also-ok", 3u32)], Expiry::Default)
            .await;
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn test_multi_delete() {
        let (_, cache) = service();
        cache.set("a", "1", Expiry::Default).await.unwrap();
        cache.set("b", "2", Expiry::Default).await.unwrap();

        assert_eq!(cache.multi_delete(&["a", "b", "c"]).await.unwrap(), 2);
        assert_eq!(cache.multi_delete::<&str>(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_timeout_is_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let config = CacheConfig {
            operation_timeout: Duration::from_millis(20),
            ..CacheConfig::default()
        };
        let cache = CacheService::new(store.clone(), config).unwrap();
        store.set_latency(Duration::from_millis(200));

        let err = cache.set("k", "v", Expiry::Default).await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(cache.get::<String>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_injected_metrics_recorder() {
        let metrics = Arc::new(AtomicMetrics::new());
        let cache = CacheService::with_metrics(
            Arc::new(MemoryStore::new()),
            CacheConfig::default(),
            metrics.clone(),
        )
        .unwrap();

        let _: Option<String> = cache.get("absent").await.unwrap();
        assert_eq!(metrics.snapshot().misses, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = CacheConfig {
            default_ttl: Duration::ZERO,
            ..CacheConfig::default()
        };
        assert!(matches!(
            CacheService::new(Arc::new(MemoryStore::new()), config),
            Err(CacheError::Config(_))
        ));
    }
}
