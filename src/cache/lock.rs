//! Distributed Lock
//!
//! Token-based mutual exclusion on top of the store: acquisition is an
//! atomic set-if-absent with expiry, release an atomic compare-and-delete,
//! so a caller can never release a lock it no longer owns.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::CacheService;
use crate::error::{CacheError, Result};

// == Lock Handle ==
/// A held lock: the logical lock key and the token stored under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub key: String,
    pub token: String,
    store_key: String,
}

/// Random token identifying one acquisition.
pub fn new_lock_token() -> String {
    Uuid::new_v4().to_string()
}

impl CacheService {
    // == Try Lock ==
    /// Single non-blocking attempt to take `lock_key` with `token`.
    ///
    /// Returns false immediately if another holder exists. The lock expires
    /// after `ttl` even if it is never released.
    pub async fn try_lock(&self, lock_key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let store_key = self.inner.keys.build_key(lock_key)?;
        self.lock_store_key(&store_key, token, ttl).await
    }

    // == Release Lock ==
    /// Releases `lock_key` only if it is still held by `token`.
    pub async fn release_lock(&self, lock_key: &str, token: &str) -> Result<bool> {
        let store_key = self.inner.keys.build_key(lock_key)?;
        self.unlock_store_key(&store_key, token).await
    }

    /// Tries to take `lock_key` with a fresh random token.
    pub async fn acquire_lock(&self, lock_key: &str, ttl: Duration) -> Result<Option<LockHandle>> {
        let store_key = self.inner.keys.build_key(lock_key)?;
        self.acquire_store_key(lock_key.to_string(), store_key, ttl).await
    }

    pub async fn release(&self, handle: &LockHandle) -> Result<bool> {
        self.unlock_store_key(&handle.store_key, &handle.token).await
    }

    /// Acquires a lock whose store key was already composed by the caller.
    pub(crate) async fn acquire_store_key(
        &self,
        lock_key: String,
        store_key: String,
        ttl: Duration,
    ) -> Result<Option<LockHandle>> {
        let token = new_lock_token();
        let acquired = self.lock_store_key(&store_key, &token, ttl).await?;
        Ok(acquired.then(|| LockHandle {
            key: lock_key,
            token,
            store_key,
        }))
    }

    async fn lock_store_key(&self, store_key: &str, token: &str, ttl: Duration) -> Result<bool> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl("lock TTL must be greater than zero".to_string()));
        }
        let acquired = self
            .call(
                "lock",
                self.inner
                    .store
                    .set_nx(store_key, token.as_bytes().to_vec(), Some(ttl)),
            )
            .await?;
        debug!(lock = %store_key, acquired, "lock attempt");
        Ok(acquired)
    }

    async fn unlock_store_key(&self, store_key: &str, token: &str) -> Result<bool> {
        let released = self
            .call(
                "unlock",
                self.inner
                    .store
                    .compare_and_delete(store_key, token.as_bytes()),
            )
            .await?;
        if !released {
            debug!(lock = %store_key, "lock not held by this token");
        }
        Ok(released)
    }

    // == Execute With Lock ==
    /// Runs `f` while holding `lock_key`, releasing the lock afterwards
    /// whether or not `f` succeeds.
    ///
    /// # Returns
    /// * `Err(LockAcquisition)` (converted into `E`) if the lock is held
    ///   elsewhere; `f` is not run
    /// * the result of `f` otherwise
    pub async fn execute_with_lock<R, E, F, Fut>(&self, lock_key: &str, ttl: Duration, f: F) -> std::result::Result<R, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<R, E>>,
    {
        let handle = self
            .acquire_lock(lock_key, ttl)
            .await?
            .ok_or_else(|| CacheError::LockAcquisition(format!("lock {} is held", lock_key)))?;

        let result = f().await;

        match self.release(&handle).await {
            Ok(true) => {}
            Ok(false) => warn!(lock = lock_key, "lock expired before release"),
            Err(err) => warn!(lock = lock_key, error = %err, "failed to release lock"),
        }
        result
    }
}
