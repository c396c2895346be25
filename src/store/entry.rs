//! Stored Entry Module
//!
//! A single key of the in-process store: typed value plus expiry metadata.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// == Stored Value ==
/// Value held under a key; one variant per native data type.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Bytes(Vec<u8>),
    Hash(HashMap<String, Vec<u8>>),
    List(VecDeque<Vec<u8>>),
    Set(HashSet<Vec<u8>>),
    /// Kept ordered by (score, member)
    SortedSet(Vec<(f64, Vec<u8>)>),
}

impl StoredValue {
    /// Native type name, as reported in WRONGTYPE errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            StoredValue::Bytes(_) => "string",
            StoredValue::Hash(_) => "hash",
            StoredValue::List(_) => "list",
            StoredValue::Set(_) => "set",
            StoredValue::SortedSet(_) => "zset",
        }
    }

    /// Collections are dropped by the store once their last element goes.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            StoredValue::Bytes(_) => false,
            StoredValue::Hash(h) => h.is_empty(),
            StoredValue::List(l) => l.is_empty(),
            StoredValue::Set(s) => s.is_empty(),
            StoredValue::SortedSet(z) => z.is_empty(),
        }
    }

    /// Rough payload footprint in bytes.
    pub fn approximate_size(&self) -> usize {
        match self {
            StoredValue::Bytes(b) => b.len(),
            StoredValue::Hash(h) => h.iter().map(|(f, v)| f.len() + v.len()).sum(),
            StoredValue::List(l) => l.iter().map(Vec::len).sum(),
            StoredValue::Set(s) => s.iter().map(Vec::len).sum(),
            StoredValue::SortedSet(z) => z.iter().map(|(_, m)| m.len() + 8).sum(),
        }
    }
}

// == Stored Entry ==
/// Represents a single store entry with value and metadata.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// The stored value
    pub value: StoredValue,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl StoredEntry {
    // == Constructor ==
    /// Creates a new entry with optional TTL.
    pub fn new(value: StoredValue, ttl: Option<Duration>) -> Self {
        let now = current_timestamp_ms();
        Self {
            value,
            created_at: now,
            expires_at: ttl.map(|ttl| now.saturating_add(duration_ms(ttl))),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    // == Expire ==
    /// Resets the expiration to `ttl` from now.
    pub fn expire_in(&mut self, ttl: Duration) {
        self.expires_at = Some(current_timestamp_ms().saturating_add(duration_ms(ttl)));
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired (TTL elapsed)
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry has no TTL (never expires)
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_ms)
        .unwrap_or_default()
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
