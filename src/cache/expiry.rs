//! TTL policy for writes.

use std::time::Duration;

use tracing::debug;

use crate::error::{CacheError, Result};

// == Expiry ==
/// Expiry attached to a write.
///
/// `Never` is an explicit choice and is never confused with `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Use the configured default TTL
    #[default]
    Default,
    /// Keep the key until it is deleted
    Never,
    /// Expire after the given duration (clamped to the configured maximum)
    After(Duration),
}

impl From<Duration> for Expiry {
    fn from(ttl: Duration) -> Self {
        Expiry::After(ttl)
    }
}

impl From<Option<Duration>> for Expiry {
    /// `None` selects the default TTL, not "no expiry".
    fn from(ttl: Option<Duration>) -> Self {
        ttl.map_or(Expiry::Default, Expiry::After)
    }
}

impl Expiry {
    /// Resolves to the TTL sent to the store; `None` means no expiry.
    pub fn resolve(self, default_ttl: Duration, max_ttl: Duration) -> Result<Option<Duration>> {
        match self {
            Expiry::Default => Ok(Some(default_ttl)),
            Expiry::Never => Ok(None),
            Expiry::After(ttl) if ttl.is_zero() => Err(CacheError::InvalidTtl(
                "TTL must be greater than zero".to_string(),
            )),
            Expiry::After(ttl) if ttl > max_ttl => {
                debug!(?ttl, ?max_ttl, "clamping TTL to maximum");
                Ok(Some(max_ttl))
            }
            Expiry::After(ttl) => Ok(Some(ttl)),
        }
    }
}
