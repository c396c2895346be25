//! Key Policy
//!
//! Composes store keys from the configured namespace and caller keys.

use crate::error::{CacheError, Result};
use crate::store::escape_glob;

/// Logical namespace holding the locks of computed entries.
pub const LOCK_NAMESPACE: &str = "lock:";

// == Key Policy ==
/// Builds namespaced store keys and enforces key limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPolicy {
    prefix: String,
    max_key_length: usize,
}

impl KeyPolicy {
    pub fn new(prefix: impl Into<String>, max_key_length: usize) -> Self {
        Self {
            prefix: prefix.into(),
            max_key_length,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    // == Build Key ==
    /// Returns `prefix + logical_key`.
    ///
    /// Fails with `InvalidKey` when the logical key is empty or the composed
    /// key exceeds the configured maximum length.
    pub fn build_key(&self, logical_key: &str) -> Result<String> {
        if logical_key.is_empty() {
            return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
        }
        let composed_len = self.prefix.len() + logical_key.len();
        if composed_len > self.max_key_length {
            return Err(CacheError::InvalidKey(format!(
                "key of {} bytes exceeds maximum length of {} bytes",
                composed_len, self.max_key_length
            )));
        }
        Ok(format!("{}{}", self.prefix, logical_key))
    }

    /// Returns the store key of the lock guarding `logical_key`.
    ///
    /// Only `logical_key` is checked against the length limit, so every
    /// storable key also has a lock.
    pub fn build_lock_key(&self, logical_key: &str) -> Result<String> {
        self.build_key(logical_key)?;
        Ok(format!("{}{}{}", self.prefix, LOCK_NAMESPACE, logical_key))
    }

    /// Scopes a glob pattern under the namespace. The prefix is matched
    /// literally.
    pub fn build_pattern(&self, pattern: &str) -> Result<String> {
        if pattern.is_empty() {
            return Err(CacheError::InvalidKey("pattern cannot be empty".to_string()));
        }
        Ok(format!("{}{}", escape_glob(&self.prefix), pattern))
    }

    /// Recovers the logical key from a store key.
    pub fn strip<'a>(&self, store_key: &'a str) -> &'a str {
        store_key.strip_prefix(&self.prefix).unwrap_or(store_key)
    }
}
