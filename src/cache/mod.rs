//! Cache Module
//!
//! Typed caching and coordination over a [`KvStore`](crate::store::KvStore):
//! namespaced keys, a compressing value codec, TTL policy, collections,
//! distributed locks, anti-stampede compute, pub/sub and statistics.

mod admin;
mod codec;
mod collections;
mod compute;
mod expiry;
mod key;
mod lock;
mod pubsub;
mod service;
mod stats;


// Re-export public types
pub use codec::{is_compressed, ValueCodec};
pub use compute::compute_lock_key;
pub use expiry::Expiry;
pub use key::KeyPolicy;
pub use lock::{new_lock_token, LockHandle};
pub use pubsub::{MessageHandler, SubscriptionId};
pub use service::CacheService;
pub use stats::{hit_rate, AtomicMetrics, CacheStats, LatencyStats, MetricsRecorder, MetricsSnapshot};
