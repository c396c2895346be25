//! Value Codec
//!
//! Converts values to and from their wire form:
//! - scalars (strings, numbers, booleans) travel in their native text form
//! - everything else is JSON, gzip-compressed once it reaches the threshold
//!
//! Decoding detects gzip by its magic header, so readers never need to know
//! which path a writer took.
//!
//! A top-level JSON null (`None`, unit) has no wire form: it would collide
//! with the string `"null"`, so encoding it fails.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// First two bytes of every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// == Value Codec ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueCodec {
    compression_enabled: bool,
    compression_threshold: usize,
}

impl ValueCodec {
    pub fn new(compression_enabled: bool, compression_threshold: usize) -> Self {
        Self {
            compression_enabled,
            compression_threshold,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.enable_compression, config.compression_threshold_bytes)
    }

    // == Encode ==
    /// Produces the wire bytes for `value`.
    ///
    /// Fails with `Encoding` when the value cannot be represented as JSON
    /// (e.g. maps with non-string keys) or serializes to a bare null.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_value(value).map_err(|e| CacheError::Encoding(e.to_string()))?;
        match json {
            Value::Null => Err(CacheError::Encoding(
                "null values cannot be stored".to_string(),
            )),
            Value::String(s) => Ok(s.into_bytes()),
            Value::Number(n) => Ok(n.to_string().into_bytes()),
            Value::Bool(b) => Ok(b.to_string().into_bytes()),
            structured => {
                let bytes = serde_json::to_vec(&structured)
                    .map_err(|e| CacheError::Encoding(e.to_string()))?;
                if self.should_compress(bytes.len()) {
                    compress(&bytes)
                } else {
                    Ok(bytes)
                }
            }
        }
    }

    /// Compression applies iff enabled and the JSON payload reaches the threshold.
    pub fn should_compress(&self, json_len: usize) -> bool {
        self.compression_enabled && json_len >= self.compression_threshold
    }

    // == Decode ==
    /// Rebuilds a `T` from wire bytes.
    ///
    /// String targets receive the payload as-is. Payloads that look like
    /// JSON objects or arrays are parsed as JSON first; every other payload
    /// (including the text `null`) is offered to `T` as a string first, then
    /// parsed (numbers, booleans).
    pub fn decode<T: DeserializeOwned>(&self, wire: &[u8]) -> Result<T> {
        let raw = if is_compressed(wire) {
            decompress(wire)?
        } else {
            wire.to_vec()
        };
        let text = String::from_utf8(raw).map_err(|e| CacheError::Decoding(e.to_string()))?;

        let looks_structured = text.starts_with('{') || text.starts_with('[');
        if looks_structured {
            match serde_json::from_str::<T>(&text) {
                Ok(value) => Ok(value),
                Err(err) => serde_json::from_value::<T>(Value::String(text))
                    .map_err(|_| CacheError::Decoding(err.to_string())),
            }
        } else {
            match serde_json::from_value::<T>(Value::String(text.clone())) {
                Ok(value) => Ok(value),
                Err(_) => serde_json::from_str::<T>(&text)
                    .map_err(|e| CacheError::Decoding(e.to_string())),
            }
        }
    }

    /// True when `value` serializes to JSON null (`None`, unit).
    pub fn is_null<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        matches!(serde_json::to_value(value), Ok(Value::Null))
    }
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Returns true if `wire` carries a gzip stream.
pub fn is_compressed(wire: &[u8]) -> bool {
    wire.starts_with(&GZIP_MAGIC)
}

fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| CacheError::Encoding(format!("gzip: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Encoding(format!("gzip: {}", e)))
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::with_capacity(bytes.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Decoding(format!("gunzip: {}", e)))?;
    Ok(out)
}
