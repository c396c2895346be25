//! Memory Store Module
//!
//! In-process implementation of [`KvStore`]: a HashMap of typed entries with
//! TTL expiration, channel fan-out for pub/sub, and fault injection for
//! exercising degraded paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::store::{
    glob_match, resolve_range, KeyTtl, KvStore, MessageReceiver, StoreMessage, StoredEntry,
    StoredValue,
};

type Entries = HashMap<String, StoredEntry>;

// == Subscriber ==
#[derive(Debug)]
struct Subscriber {
    channels: HashSet<String>,
    tx: mpsc::UnboundedSender<StoreMessage>,
}

// == Memory Store ==
/// In-process key-value store with native data types and TTL support.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Key-value storage
    entries: RwLock<Entries>,
    /// Live pub/sub subscriptions
    subscribers: Mutex<Vec<Subscriber>>,
    /// When set, every operation fails as if the store were unreachable
    offline: AtomicBool,
    /// Artificial delay added to every operation, in milliseconds
    latency_ms: AtomicU64,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // == Fault Injection ==
    /// Simulates losing (or regaining) the connection to the store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delays every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn guard(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::StoreUnavailable(
                "memory store is offline".to_string(),
            ));
        }
        Ok(())
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the store.
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    // == Length ==
    /// Returns the number of live (unexpired) keys.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    // == Is Empty ==
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of subscriptions whose receiver is still alive.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }
}

// == Entry Helpers ==
fn live<'a>(entries: &'a Entries, key: &str) -> Option<&'a StoredEntry> {
    entries.get(key).filter(|entry| !entry.is_expired())
}

fn purge_expired(entries: &mut Entries, key: &str) {
    if entries.get(key).is_some_and(StoredEntry::is_expired) {
        entries.remove(key);
    }
}

fn drop_if_empty(entries: &mut Entries, key: &str) {
    if entries
        .get(key)
        .is_some_and(|entry| entry.value.is_empty_collection())
    {
        entries.remove(key);
    }
}

fn wrong_type(key: &str, found: &StoredValue) -> CacheError {
    CacheError::Store(format!(
        "WRONGTYPE operation against key '{}' holding a {}",
        key,
        found.type_name()
    ))
}

/// Generates typed read/write accessors for one StoredValue variant.
/// Writers create an empty value of the right type when the key is absent.
macro_rules! typed_access {
    ($read:ident, $write:ident, $variant:ident, $ty:ty) => {
        fn $read<'a>(entries: &'a Entries, key: &str) -> Result<Option<&'a $ty>> {
            match live(entries, key) {
                None => Ok(None),
                Some(entry) => match &entry.value {
                    StoredValue::$variant(v) => Ok(Some(v)),
                    other => Err(wrong_type(key, other)),
                },
            }
        }

        fn $write<'a>(entries: &'a mut Entries, key: &str) -> Result<&'a mut $ty> {
            purge_expired(entries, key);
            let entry = entries.entry(key.to_string()).or_insert_with(|| {
                StoredEntry::new(StoredValue::$variant(Default::default()), None)
            });
            match &mut entry.value {
                StoredValue::$variant(v) => Ok(v),
                other => Err(wrong_type(key, other)),
            }
        }
    };
}

typed_access!(bytes_ref, bytes_mut, Bytes, Vec<u8>);
typed_access!(hash_ref, hash_mut, Hash, HashMap<String, Vec<u8>>);
typed_access!(list_ref, list_mut, List, std::collections::VecDeque<Vec<u8>>);
typed_access!(set_ref, set_mut, Set, HashSet<Vec<u8>>);
typed_access!(zset_ref, zset_mut, SortedSet, Vec<(f64, Vec<u8>)>);

fn zset_position(zset: &[(f64, Vec<u8>)], score: f64, member: &[u8]) -> usize {
    zset.partition_point(|(s, m)| {
        s.total_cmp(&score)
            .then_with(|| m.as_slice().cmp(member))
            .is_lt()
    })
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(bytes_ref(&entries, key)?.cloned())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.guard().await?;
        let entries = self.entries.read().await;
        // MGET answers nil for keys of another type instead of failing
        Ok(keys
            .iter()
            .map(|key| bytes_ref(&entries, key).ok().flatten().cloned())
            .collect())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            StoredEntry::new(StoredValue::Bytes(value), ttl),
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        if live(&entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredEntry::new(StoredValue::Bytes(value), ttl),
        );
        Ok(true)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        let raw = bytes_mut(&mut entries, key)?;
        let current = if raw.is_empty() {
            0
        } else {
            std::str::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| {
                    CacheError::Store("ERR value is not an integer or out of range".into())
                })?
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| CacheError::Store("ERR increment or decrement would overflow".into()))?;
        *raw = next.to_string().into_bytes();
        Ok(next)
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if !entry.is_expired() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(live(&entries, key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        purge_expired(&mut entries, key);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expire_in(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(match live(&entries, key) {
            None => KeyTtl::Missing,
            Some(entry) => match entry.ttl_remaining_ms() {
                None => KeyTtl::Persistent,
                Some(ms) => KeyTtl::Expires(Duration::from_millis(ms)),
            },
        })
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.guard().await?;
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        self.guard().await?;
        // Single write guard makes the compare and the delete one step
        let mut entries = self.entries.write().await;
        let matches = matches!(
            live(&entries, key).map(|e| &e.value),
            Some(StoredValue::Bytes(current)) if current.as_slice() == expected
        );
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> Result<bool> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        let hash = hash_mut(&mut entries, key)?;
        Ok(hash.insert(field.to_string(), value).is_none())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(hash_ref(&entries, key)?.and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>> {
        self.guard().await?;
        let entries = self.entries.read().await;
        let mut pairs: Vec<(String, Vec<u8>)> = hash_ref(&entries, key)?
            .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        if hash_ref(&entries, key)?.is_none() {
            return Ok(0);
        }
        let hash = hash_mut(&mut entries, key)?;
        let removed = fields.iter().filter(|f| hash.remove(*f).is_some()).count();
        drop_if_empty(&mut entries, key);
        Ok(removed as u64)
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(hash_ref(&entries, key)?.is_some_and(|h| h.contains_key(field)))
    }

    async fn hlen(&self, key: &str) -> Result<u64> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(hash_ref(&entries, key)?.map_or(0, |h| h.len() as u64))
    }

    async fn lpush(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        let list = list_mut(&mut entries, key)?;
        for value in values {
            list.push_front(value);
        }
        let len = list.len() as u64;
        drop_if_empty(&mut entries, key);
        Ok(len)
    }

    async fn rpush(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        let list = list_mut(&mut entries, key)?;
        list.extend(values);
        let len = list.len() as u64;
        drop_if_empty(&mut entries, key);
        Ok(len)
    }

    async fn lpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        if list_ref(&entries, key)?.is_none() {
            return Ok(None);
        }
        let popped = list_mut(&mut entries, key)?.pop_front();
        drop_if_empty(&mut entries, key);
        Ok(popped)
    }

    async fn rpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        if list_ref(&entries, key)?.is_none() {
            return Ok(None);
        }
        let popped = list_mut(&mut entries, key)?.pop_back();
        drop_if_empty(&mut entries, key);
        Ok(popped)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        self.guard().await?;
        let entries = self.entries.read().await;
        let Some(list) = list_ref(&entries, key)? else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(list_ref(&entries, key)?.map_or(0, |l| l.len() as u64))
    }

    async fn sadd(&self, key: &str, members: Vec<Vec<u8>>) -> Result<u64> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        let set = set_mut(&mut entries, key)?;
        let added = members.into_iter().filter(|m| set.insert(m.clone())).count();
        drop_if_empty(&mut entries, key);
        Ok(added as u64)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        self.guard().await?;
        let entries = self.entries.read().await;
        let mut members: Vec<Vec<u8>> = set_ref(&entries, key)?
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn sismember(&self, key: &str, member: &[u8]) -> Result<bool> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(set_ref(&entries, key)?.is_some_and(|s| s.contains(member)))
    }

    async fn srem(&self, key: &str, members: Vec<Vec<u8>>) -> Result<u64> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        if set_ref(&entries, key)?.is_none() {
            return Ok(0);
        }
        let set = set_mut(&mut entries, key)?;
        let removed = members.iter().filter(|m| set.remove(m.as_slice())).count();
        drop_if_empty(&mut entries, key);
        Ok(removed as u64)
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(set_ref(&entries, key)?.map_or(0, |s| s.len() as u64))
    }

    async fn zadd(&self, key: &str, member: Vec<u8>, score: f64) -> Result<bool> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        let zset = zset_mut(&mut entries, key)?;
        let existing = zset.iter().position(|(_, m)| *m == member);
        let added = existing.is_none();
        if let Some(index) = existing {
            zset.remove(index);
        }
        let at = zset_position(zset, score, &member);
        zset.insert(at, (score, member));
        Ok(added)
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        self.guard().await?;
        let entries = self.entries.read().await;
        let Some(zset) = zset_ref(&entries, key)? else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(zset.len(), start, stop) {
            Some((from, to)) => zset[from..=to].iter().map(|(_, m)| m.clone()).collect(),
            None => Vec::new(),
        })
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<Vec<u8>>> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(zset_ref(&entries, key)?
            .map(|zset| {
                zset.iter()
                    .filter(|(score, _)| *score >= min && *score <= max)
                    .map(|(_, m)| m.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn zrem(&self, key: &str, member: &[u8]) -> Result<bool> {
        self.guard().await?;
        let mut entries = self.entries.write().await;
        if zset_ref(&entries, key)?.is_none() {
            return Ok(false);
        }
        let zset = zset_mut(&mut entries, key)?;
        let removed = match zset.iter().position(|(_, m)| m.as_slice() == member) {
            Some(index) => {
                zset.remove(index);
                true
            }
            None => false,
        };
        drop_if_empty(&mut entries, key);
        Ok(removed)
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(zset_ref(&entries, key)?.map_or(0, |z| z.len() as u64))
    }

    async fn zscore(&self, key: &str, member: &[u8]) -> Result<Option<f64>> {
        self.guard().await?;
        let entries = self.entries.read().await;
        Ok(zset_ref(&entries, key)?.and_then(|z| {
            z.iter()
                .find(|(_, m)| m.as_slice() == member)
                .map(|(score, _)| *score)
        }))
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<u64> {
        self.guard().await?;
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        let mut delivered = 0;
        for subscriber in subscribers.iter().filter(|s| s.channels.contains(channel)) {
            let message = StoreMessage {
                channel: channel.to_string(),
                payload: payload.clone(),
            };
            if subscriber.tx.send(message).is_ok() {
                delivered += 1;
            }
        }
        debug!(channel, delivered, "memory store publish");
        Ok(delivered)
    }

    async fn subscribe(&self, channels: &[String]) -> Result<MessageReceiver> {
        self.guard().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber {
            channels: channels.iter().cloned().collect(),
            tx,
        });
        Ok(rx)
    }

    async fn ping(&self) -> Result<()> {
        self.guard().await
    }

    async fn used_memory(&self) -> Result<Option<u64>> {
        self.guard().await?;
        let entries = self.entries.read().await;
        let bytes: usize = entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, entry)| key.len() + entry.value.approximate_size())
            .sum();
        Ok(Some(bytes as u64))
    }
}
