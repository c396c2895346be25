//! Collection Operations
//!
//! Hash, list, set and sorted-set operations. Elements pass through the
//! value codec on both sides; hash field names are stored as given.
//!
//! Reads of whole collections degrade to empty results when the store is
//! unreachable, and elements that fail to decode are skipped. Writes, pops
//! and size queries report store failures. Collections carry no TTL of
//! their own; use [`CacheService::expire`] on the key.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::cache::CacheService;
use crate::error::Result;

impl CacheService {
    fn encode_element<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>> {
        self.inner.codec.encode(value)
    }

    fn encode_elements<V: Serialize>(&self, values: &[V]) -> Result<Vec<Vec<u8>>> {
        values.iter().map(|v| self.encode_element(v)).collect()
    }

    /// Decodes every element, dropping the ones that fail.
    fn decode_elements<T: DeserializeOwned>(&self, key: &str, wires: Vec<Vec<u8>>) -> Vec<T> {
        wires
            .into_iter()
            .filter_map(|wire| self.decode_or_log(key, &wire))
            .collect()
    }

    fn degraded<T: Default>(&self, op: &str, key: &str, result: Result<T>) -> T {
        result.unwrap_or_else(|err| {
            warn!(op, key, error = %err, "collection read degraded to empty");
            T::default()
        })
    }

    // == Hash ==
    /// Sets `field` in the hash at `key`; true when the field is new.
    pub async fn hash_set<V>(&self, key: &str, field: &str, value: &V) -> Result<bool>
    where
        V: Serialize + ?Sized,
    {
        let store_key = self.inner.keys.build_key(key)?;
        let wire = self.encode_element(value)?;
        self.call("hset", self.inner.store.hset(&store_key, field, wire))
            .await
    }

    pub async fn hash_get<T: DeserializeOwned>(&self, key: &str, field: &str) -> Result<Option<T>> {
        let store_key = self.inner.keys.build_key(key)?;
        let wire = self.call("hget", self.inner.store.hget(&store_key, field)).await;
        Ok(self
            .degraded("hget", &store_key, wire)
            .and_then(|w| self.decode_or_log(&store_key, &w)))
    }

    /// All fields of the hash; empty when the hash does not exist.
    pub async fn hash_get_all<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<(String, T)>> {
        let store_key = self.inner.keys.build_key(key)?;
        let pairs = self.call("hgetall", self.inner.store.hgetall(&store_key)).await;
        let mut fields: Vec<(String, T)> = self
            .degraded("hgetall", &store_key, pairs)
            .into_iter()
            .filter_map(|(field, wire)| {
                self.decode_or_log(&store_key, &wire)
                    .map(|value| (field, value))
            })
            .collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(fields)
    }

    /// Removes fields; returns how many existed.
    pub async fn hash_delete<F: AsRef<str>>(&self, key: &str, fields: &[F]) -> Result<u64> {
        let store_key = self.inner.keys.build_key(key)?;
        if fields.is_empty() {
            return Ok(0);
        }
        let fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self.call("hdel", self.inner.store.hdel(&store_key, &fields))
            .await
    }

    pub async fn hash_exists(&self, key: &str, field: &str) -> Result<bool> {
        let store_key = self.inner.keys.build_key(key)?;
        self.call("hexists", self.inner.store.hexists(&store_key, field))
            .await
    }

    pub async fn hash_len(&self, key: &str) -> Result<u64> {
        let store_key = self.inner.keys.build_key(key)?;
        self.call("hlen", self.inner.store.hlen(&store_key)).await
    }

    // == List ==
    /// Prepends values in order, so the last value ends up at the head.
    /// Returns the new list length.
    pub async fn list_push_left<V: Serialize>(&self, key: &str, values: &[V]) -> Result<u64> {
        let store_key = self.inner.keys.build_key(key)?;
        let wires = self.encode_elements(values)?;
        if wires.is_empty() {
            return self.list_len(key).await;
        }
        self.call("lpush", self.inner.store.lpush(&store_key, wires))
            .await
    }

    /// Appends values in order; returns the new list length.
    pub async fn list_push_right<V: Serialize>(&self, key: &str, values: &[V]) -> Result<u64> {
        let store_key = self.inner.keys.build_key(key)?;
        let wires = self.encode_elements(values)?;
        if wires.is_empty() {
            return self.list_len(key).await;
        }
        self.call("rpush", self.inner.store.rpush(&store_key, wires))
            .await
    }

    pub async fn list_pop_left<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let store_key = self.inner.keys.build_key(key)?;
        let wire = self.call("lpop", self.inner.store.lpop(&store_key)).await?;
        wire.map(|w| self.inner.codec.decode(&w)).transpose()
    }

    pub async fn list_pop_right<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let store_key = self.inner.keys.build_key(key)?;
        let wire = self.call("rpop", self.inner.store.rpop(&store_key)).await?;
        wire.map(|w| self.inner.codec.decode(&w)).transpose()
    }

    /// Elements between `start` and `stop` inclusive; negative indexes
    /// count from the tail (`0, -1` is the whole list).
    pub async fn list_range<T: DeserializeOwned>(&self, key: &str, start: i64, stop: i64) -> Result<Vec<T>> {
        let store_key = self.inner.keys.build_key(key)?;
        let wires = self
            .call("lrange", self.inner.store.lrange(&store_key, start, stop))
            .await;
        let wires = self.degraded("lrange", &store_key, wires);
        Ok(self.decode_elements(&store_key, wires))
    }

    pub async fn list_len(&self, key: &str) -> Result<u64> {
        let store_key = self.inner.keys.build_key(key)?;
        self.call("llen", self.inner.store.llen(&store_key)).await
    }

    // == Set ==
    /// Adds members; returns how many were not already present.
    pub async fn set_add<V: Serialize>(&self, key: &str, members: &[V]) -> Result<u64> {
        let store_key = self.inner.keys.build_key(key)?;
        let wires = self.encode_elements(members)?;
        if wires.is_empty() {
            return Ok(0);
        }
        self.call("sadd", self.inner.store.sadd(&store_key, wires))
            .await
    }

    /// Members in no particular order; empty when the set does not exist.
    pub async fn set_members<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let store_key = self.inner.keys.build_key(key)?;
        let wires = self.call("smembers", self.inner.store.smembers(&store_key)).await;
        let wires = self.degraded("smembers", &store_key, wires);
        Ok(self.decode_elements(&store_key, wires))
    }

    pub async fn set_is_member<V>(&self, key: &str, member: &V) -> Result<bool>
    where
        V: Serialize + ?Sized,
    {
        let store_key = self.inner.keys.build_key(key)?;
        let wire = self.encode_element(member)?;
        self.call("sismember", self.inner.store.sismember(&store_key, &wire))
            .await
    }

    /// Removes members; returns how many were present.
    pub async fn set_remove<V: Serialize>(&self, key: &str, members: &[V]) -> Result<u64> {
        let store_key = self.inner.keys.build_key(key)?;
        let wires = self.encode_elements(members)?;
        if wires.is_empty() {
            return Ok(0);
        }
        self.call("srem", self.inner.store.srem(&store_key, wires))
            .await
    }

    pub async fn set_len(&self, key: &str) -> Result<u64> {
        let store_key = self.inner.keys.build_key(key)?;
        self.call("scard", self.inner.store.scard(&store_key)).await
    }

    // == Sorted Set ==
    /// Adds `member` with `score`, or updates its score; true when new.
    pub async fn zset_add<V>(&self, key: &str, member: &V, score: f64) -> Result<bool>
    where
        V: Serialize + ?Sized,
    {
        let store_key = self.inner.keys.build_key(key)?;
        let wire = self.encode_element(member)?;
        self.call("zadd", self.inner.store.zadd(&store_key, wire, score))
            .await
    }

    /// Members by rank in ascending score order, inclusive indexes.
    pub async fn zset_range<T: DeserializeOwned>(&self, key: &str, start: i64, stop: i64) -> Result<Vec<T>> {
        let store_key = self.inner.keys.build_key(key)?;
        let wires = self
            .call("zrange", self.inner.store.zrange(&store_key, start, stop))
            .await;
        let wires = self.degraded("zrange", &store_key, wires);
        Ok(self.decode_elements(&store_key, wires))
    }

    /// Members with `min <= score <= max`, ascending.
    pub async fn zset_range_by_score<T: DeserializeOwned>(&self, key: &str, min: f64, max: f64) -> Result<Vec<T>> {
        let store_key = self.inner.keys.build_key(key)?;
        let wires = self
            .call("zrangebyscore", self.inner.store.zrangebyscore(&store_key, min, max))
            .await;
        let wires = self.degraded("zrangebyscore", &store_key, wires);
        Ok(self.decode_elements(&store_key, wires))
    }

    pub async fn zset_remove<V>(&self, key: &str, member: &V) -> Result<bool>
    where
        V: Serialize + ?Sized,
    {
        let store_key = self.inner.keys.build_key(key)?;
        let wire = self.encode_element(member)?;
        self.call("zrem", self.inner.store.zrem(&store_key, &wire))
            .await
    }

    pub async fn zset_len(&self, key: &str) -> Result<u64> {
        let store_key = self.inner.keys.build_key(key)?;
        self.call("zcard", self.inner.store.zcard(&store_key)).await
    }

    pub async fn zset_score<V>(&self, key: &str, member: &V) -> Result<Option<f64>>
    where
        V: Serialize + ?Sized,
    {
        let store_key = self.inner.keys.build_key(key)?;
        let wire = self.encode_element(member)?;
        self.call("zscore", self.inner.store.zscore(&store_key, &wire))
            .await
    }
}
