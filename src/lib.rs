//! Cache Service - distributed cache and coordination over a key-value store
//!
//! Typed caching with TTL policy and transparent compression, collection
//! types, token-based distributed locks, stampede-safe `get_or_compute`,
//! pub/sub and operational statistics. Runs against Redis or an in-process
//! store.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{CacheService, CacheStats, Expiry, LockHandle, MessageHandler, SubscriptionId};
pub use config::{CacheConfig, ServerConfig};
pub use error::{CacheError, Result};
pub use store::{KeyTtl, KvStore, MemoryStore, StoreMessage};
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use tasks::spawn_cleanup_task;
