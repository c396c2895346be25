//! Redis Store Module
//!
//! [`KvStore`] backed by a Redis server over a multiplexed async connection.
//! Pub/sub uses a dedicated connection per subscription, forwarded into a
//! channel by a background task.

use std::num::NonZeroUsize;
use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, ExistenceCheck, Script, SetExpiry, SetOptions};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::store::{duration_ms, KeyTtl, KvStore, MessageReceiver, StoreMessage};

/// Deletes KEYS[1] only when it still holds ARGV[1].
const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

// == Redis Store ==
/// Redis-backed store.
///
/// Features:
/// - Connection sharing via a multiplexed connection
/// - Atomic lock release via a Lua script
/// - Pub/sub via per-subscription connections
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: MultiplexedConnection,
    release_script: Script,
}

impl RedisStore {
    /// Connects to the Redis server at `url` (e.g. "redis://localhost:6379").
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| CacheError::Config(format!("Redis client error: {}", e)))?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!(url, "connected to redis");
        Ok(Self {
            client,
            conn,
            release_script: Script::new(COMPARE_AND_DELETE_SCRIPT),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

fn px(ttl: Duration) -> u64 {
    // PX 0 is rejected by Redis, as is anything beyond i64
    duration_ms(ttl).clamp(1, i64::MAX as u64)
}

#[async_trait]
impl KvStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.conn().get(key).await?)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        // Always returns a bulk array, even for a single key
        let values: Vec<Option<Vec<u8>>> = ::redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut self.conn())
            .await?;
        Ok(values)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => {
                let options = SetOptions::default().with_expiration(SetExpiry::PX(px(ttl)));
                let _: () = conn.set_options(key, value, options).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        let mut options = SetOptions::default().conditional_set(ExistenceCheck::NX);
        if let Some(ttl) = ttl {
            options = options.with_expiration(SetExpiry::PX(px(ttl)));
        }
        let reply: Option<String> = self.conn().set_options(key, value, options).await?;
        Ok(reply.is_some())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        Ok(self.conn().incr(key, delta).await?)
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.conn().del(keys).await?)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.conn().exists(key).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        Ok(self.conn().pexpire(key, px(ttl) as i64).await?)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let pttl: i64 = self.conn().pttl(key).await?;
        Ok(KeyTtl::from_pttl(pttl))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self.conn().keys(pattern).await?)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut self.conn())
            .await?;
        Ok(deleted == 1)
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> Result<bool> {
        let added: i64 = self.conn().hset(key, field, value).await?;
        Ok(added == 1)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.conn().hget(key, field).await?)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut pairs: Vec<(String, Vec<u8>)> = self.conn().hgetall(key).await?;
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        Ok(self.conn().hdel(key, fields).await?)
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        Ok(self.conn().hexists(key, field).await?)
    }

    async fn hlen(&self, key: &str) -> Result<u64> {
        Ok(self.conn().hlen(key).await?)
    }

    async fn lpush(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64> {
        if values.is_empty() {
            return self.llen(key).await;
        }
        Ok(self.conn().lpush(key, values).await?)
    }

    async fn rpush(&self, key: &str, values: Vec<Vec<u8>>) -> Result<u64> {
        if values.is_empty() {
            return self.llen(key).await;
        }
        Ok(self.conn().rpush(key, values).await?)
    }

    async fn lpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.conn().lpop(key, None::<NonZeroUsize>).await?)
    }

    async fn rpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.conn().rpop(key, None::<NonZeroUsize>).await?)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .conn()
            .lrange(key, start as isize, stop as isize)
            .await?)
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        Ok(self.conn().llen(key).await?)
    }

    async fn sadd(&self, key: &str, members: Vec<Vec<u8>>) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        Ok(self.conn().sadd(key, members).await?)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        let mut members: Vec<Vec<u8>> = self.conn().smembers(key).await?;
        members.sort();
        Ok(members)
    }

    async fn sismember(&self, key: &str, member: &[u8]) -> Result<bool> {
        Ok(self.conn().sismember(key, member).await?)
    }

    async fn srem(&self, key: &str, members: Vec<Vec<u8>>) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        Ok(self.conn().srem(key, members).await?)
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        Ok(self.conn().scard(key).await?)
    }

    async fn zadd(&self, key: &str, member: Vec<u8>, score: f64) -> Result<bool> {
        let added: i64 = self.conn().zadd(key, member, score).await?;
        Ok(added == 1)
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .conn()
            .zrange(key, start as isize, stop as isize)
            .await?)
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<Vec<u8>>> {
        Ok(self.conn().zrangebyscore(key, min, max).await?)
    }

    async fn zrem(&self, key: &str, member: &[u8]) -> Result<bool> {
        let removed: i64 = self.conn().zrem(key, member).await?;
        Ok(removed == 1)
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        Ok(self.conn().zcard(key).await?)
    }

    async fn zscore(&self, key: &str, member: &[u8]) -> Result<Option<f64>> {
        Ok(self.conn().zscore(key, member).await?)
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<u64> {
        Ok(self.conn().publish(channel, payload).await?)
    }

    async fn subscribe(&self, channels: &[String]) -> Result<MessageReceiver> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in channels {
            pubsub.subscribe(channel).await?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let channels = channels.to_vec();
        tokio::spawn(async move {
            use futures::StreamExt;

            let messages = pubsub.on_message().map(|msg| StoreMessage {
                channel: msg.get_channel_name().to_string(),
                payload: msg.get_payload_bytes().to_vec(),
            });
            forward_messages(messages, tx, channels).await;
        });
        Ok(rx)
    }

    async fn ping(&self) -> Result<()> {
        let _: String = ::redis::cmd("PING").query_async(&mut self.conn()).await?;
        Ok(())
    }

    async fn used_memory(&self) -> Result<Option<u64>> {
        let info: String = ::redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut self.conn())
            .await?;
        Ok(parse_used_memory(&info))
    }
}

/// Pumps `messages` into `tx` until the stream ends or the receiver is
/// dropped. Returning drops the stream and with it the pub/sub connection.
async fn forward_messages<S>(messages: S, tx: mpsc::UnboundedSender<StoreMessage>, channels: Vec<String>)
where
    S: futures::Stream<Item = StoreMessage>,
{
    use futures::StreamExt;

    futures::pin_mut!(messages);
    loop {
        tokio::select! {
            next = messages.next() => {
                let Some(message) = next else {
                    warn!(?channels, "redis subscription stream ended");
                    break;
                };
                if tx.send(message).is_err() {
                    break;
                }
            }
            _ = tx.closed() => {
                debug!(?channels, "redis subscription cancelled");
                break;
            }
        }
    }
}

/// Extracts `used_memory:<bytes>` from an INFO reply.
fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("used_memory:"))
        .and_then(|value| value.trim().parse().ok())
}
