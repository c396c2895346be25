//! Anti-Stampede Compute
//!
//! `get_or_compute` lets many concurrent callers share one computation of a
//! missing value. The first caller to miss takes a short-lived lock and
//! populates the cache; callers that lose the lock race compute on their
//! own without writing, so nobody waits on another caller's work.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::key::LOCK_NAMESPACE;
use crate::cache::{CacheService, Expiry, LockHandle};
use crate::error::CacheError;

/// Logical lock key guarding the computation of `key`.
pub fn compute_lock_key(key: &str) -> String {
    format!("{}{}", LOCK_NAMESPACE, key)
}

impl CacheService {
    // == Get Or Compute ==
    /// Returns the cached value for `key`, computing and caching it on a miss.
    ///
    /// # Arguments
    /// * `key` - Logical cache key
    /// * `ttl` - Expiry applied when the computed value is written
    /// * `compute` - Produces the value; its error is returned unchanged
    ///
    /// # Returns
    /// The cached or freshly computed value. `None`-like results (anything
    /// serializing to null) are returned but never cached.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &str, ttl: impl Into<Expiry>, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let ttl = ttl.into();
        if let Some(cached) = self.get::<T>(key).await? {
            return Ok(cached);
        }

        let store_key = self.inner.keys.build_key(key)?;
        let lock_store_key = self.inner.keys.build_lock_key(key)?;
        let lock_ttl = self.inner.config.compute_lock_ttl;
        let handle = match self
            .acquire_store_key(compute_lock_key(key), lock_store_key, lock_ttl)
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                warn!(key, error = %err, "compute lock unavailable, treating as contention");
                None
            }
        };

        let Some(handle) = handle else {
            debug!(key, "compute lock contended, computing without caching");
            return compute().await;
        };

        if let Some(cached) = self.lookup::<T>(&store_key).await {
            debug!(key, "value populated while waiting for lock");
            self.release_compute_lock(&handle).await;
            return Ok(cached);
        }

        let result = compute().await;
        if let Ok(value) = &result {
            if self.inner.codec.is_null(value) {
                debug!(key, "computed value is null, not caching");
            } else if let Err(err) = self.set(key, value, ttl).await {
                warn!(key, error = %err, "failed to cache computed value");
            }
        }
        self.release_compute_lock(&handle).await;
        result
    }

    async fn release_compute_lock(&self, handle: &LockHandle) {
        match self.release(handle).await {
            Ok(true) => {}
            Ok(false) => warn!(lock = %handle.key, "compute lock expired before release"),
            Err(err) => warn!(lock = %handle.key, error = %err, "failed to release compute lock"),
        }
    }
}
