//! Response models for the admin API
//!
//! DTOs serialized into HTTP response bodies. Statistics are served
//! directly as [`CacheStats`](crate::cache::CacheStats).

pub mod responses;

pub use responses::{ClearResponse, HealthResponse, TtlResponse};
