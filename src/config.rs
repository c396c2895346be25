//! Configuration Module
//!
//! Cache behaviour (`CacheConfig`) and the admin server settings
//! (`ServerConfig`), both loadable from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Cache service configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Namespace prepended to every logical key
    pub key_prefix: String,
    /// TTL applied when a write does not specify one
    pub default_ttl: Duration,
    /// Upper bound for caller-supplied TTLs
    pub max_ttl: Duration,
    /// Gzip structured payloads at or above the threshold
    pub enable_compression: bool,
    /// Serialized size in bytes from which compression kicks in
    pub compression_threshold_bytes: usize,
    /// Maximum length of the composed (prefixed) key in bytes
    pub max_key_length: usize,
    /// Budget for a single store round trip
    pub operation_timeout: Duration,
    /// Lock TTL used by `get_or_compute`
    pub compute_lock_ttl: Duration,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_KEY_PREFIX` - Key namespace (default: "cache:")
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `CACHE_MAX_TTL` - Maximum TTL in seconds (default: 604800)
    /// - `CACHE_ENABLE_COMPRESSION` - Enable gzip (default: true)
    /// - `CACHE_COMPRESSION_THRESHOLD` - Threshold in bytes (default: 1024)
    /// - `CACHE_MAX_KEY_LENGTH` - Composed key limit in bytes (default: 512)
    /// - `CACHE_OPERATION_TIMEOUT_MS` - Per-operation timeout (default: 2000)
    /// - `CACHE_LOCK_TTL` - Compute lock TTL in seconds (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            default_ttl: env_parse("CACHE_DEFAULT_TTL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            max_ttl: env_parse("CACHE_MAX_TTL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_ttl),
            enable_compression: env_parse("CACHE_ENABLE_COMPRESSION")
                .unwrap_or(defaults.enable_compression),
            compression_threshold_bytes: env_parse("CACHE_COMPRESSION_THRESHOLD")
                .unwrap_or(defaults.compression_threshold_bytes),
            max_key_length: env_parse("CACHE_MAX_KEY_LENGTH").unwrap_or(defaults.max_key_length),
            operation_timeout: env_parse("CACHE_OPERATION_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.operation_timeout),
            compute_lock_ttl: env_parse("CACHE_LOCK_TTL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.compute_lock_ttl),
        }
    }

    /// Checks that the settings are consistent with each other.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl.is_zero() {
            return Err(CacheError::Config("default_ttl must be positive".into()));
        }
        if self.max_ttl < self.default_ttl {
            return Err(CacheError::Config(format!(
                "max_ttl ({:?}) is shorter than default_ttl ({:?})",
                self.max_ttl, self.default_ttl
            )));
        }
        if self.key_prefix.len() >= self.max_key_length {
            return Err(CacheError::Config(format!(
                "key_prefix leaves no room under max_key_length {}",
                self.max_key_length
            )));
        }
        if self.operation_timeout.is_zero() {
            return Err(CacheError::Config("operation_timeout must be positive".into()));
        }
        if self.compute_lock_ttl.is_zero() {
            return Err(CacheError::Config("compute_lock_ttl must be positive".into()));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "cache:".to_string(),
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(7 * 24 * 3600),
            enable_compression: true,
            compression_threshold_bytes: 1024,
            max_key_length: 512,
            operation_timeout: Duration::from_millis(2000),
            compute_lock_ttl: Duration::from_secs(10),
        }
    }
}

/// Admin server parameters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port
    pub server_port: u16,
    /// Memory store cleanup interval in seconds
    pub cleanup_interval: u64,
    /// Redis endpoint; the in-process store is used when unset
    pub redis_url: Option<String>,
    pub cache: CacheConfig,
}

impl ServerConfig {
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    /// - `REDIS_URL` - e.g. "redis://localhost:6379" (default: unset)
    /// - plus every `CACHE_*` variable read by [`CacheConfig::from_env`]
    pub fn from_env() -> Self {
        Self {
            server_port: env_parse("SERVER_PORT").unwrap_or(3000),
            cleanup_interval: env_parse("CLEANUP_INTERVAL").unwrap_or(1),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            cache: CacheConfig::from_env(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cleanup_interval: 1,
            redis_url: None,
            cache: CacheConfig::default(),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.key_prefix, "cache:");
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
        assert!(config.enable_compression);
        assert_eq!(config.compression_threshold_bytes, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_KEY_PREFIX");
        env::remove_var("CACHE_DEFAULT_TTL");
        env::remove_var("CACHE_MAX_TTL");
        env::remove_var("CACHE_ENABLE_COMPRESSION");
        env::remove_var("CACHE_COMPRESSION_THRESHOLD");
        env::remove_var("CACHE_MAX_KEY_LENGTH");
        env::remove_var("CACHE_OPERATION_TIMEOUT_MS");
        env::remove_var("CACHE_LOCK_TTL");

        assert_eq!(CacheConfig::from_env(), CacheConfig::default());
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cleanup_interval, 1);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_validate_rejects_max_below_default() {
        let config = CacheConfig {
            max_ttl: Duration::from_secs(10),
            ..CacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_prefix() {
        let config = CacheConfig {
            key_prefix: "p".repeat(16),
            max_key_length: 16,
            ..CacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }
}
