//! Cache Statistics Module
//!
//! Hit/miss counters and per-operation latency, recorded through an
//! injectable [`MetricsRecorder`].

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

// == Metrics Recorder ==
/// Sink for cache metrics, held by each service instance.
pub trait MetricsRecorder: Send + Sync + Debug {
    fn record_hit(&self);
    fn record_miss(&self);
    fn record_latency(&self, op: &'static str, elapsed: Duration);
    /// Degraded reads, failed writes, timeouts.
    fn record_error(&self, _op: &'static str) {}
    fn snapshot(&self) -> MetricsSnapshot;
}

// == Latency Stats ==
/// Aggregated timings for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub total_micros: u64,
    pub max_micros: u64,
}

impl LatencyStats {
    fn observe(&mut self, elapsed: Duration) {
        let micros = elapsed.as_micros() as u64;
        self.count += 1;
        self.total_micros = self.total_micros.saturating_add(micros);
        self.max_micros = self.max_micros.max(micros);
    }

    /// Mean latency in microseconds, 0 when nothing was recorded.
    pub fn mean_micros(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_micros as f64 / self.count as f64
        }
    }
}

/// Point-in-time copy of a recorder's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub latencies: BTreeMap<String, LatencyStats>,
}

// == Atomic Metrics ==
/// Default in-process recorder.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    latencies: Mutex<HashMap<&'static str, LatencyStats>>,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsRecorder for AtomicMetrics {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, op: &'static str, elapsed: Duration) {
        self.latencies.lock().entry(op).or_default().observe(elapsed);
    }

    fn record_error(&self, _op: &'static str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            latencies: self
                .latencies
                .lock()
                .iter()
                .map(|(op, stats)| (op.to_string(), *stats))
                .collect(),
        }
    }
}

// == Cache Stats ==
/// Cache performance report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hit_count: u64,
    /// Number of failed retrievals (absent, expired, undecodable, store down)
    pub miss_count: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
    /// Keys under the namespace; None when the store could not be asked
    pub total_keys: Option<u64>,
    /// Store memory in bytes; None when unknown
    pub used_memory: Option<u64>,
    pub error_count: u64,
    pub latencies: BTreeMap<String, LatencyStats>,
}

impl CacheStats {
    // == Constructor ==
    /// Builds a report from recorder counters and store figures.
    pub fn new(snapshot: MetricsSnapshot, total_keys: Option<u64>, used_memory: Option<u64>) -> Self {
        Self {
            hit_count: snapshot.hits,
            miss_count: snapshot.misses,
            hit_rate: hit_rate(snapshot.hits, snapshot.misses),
            total_keys,
            used_memory,
            error_count: snapshot.errors,
            latencies: snapshot.latencies,
        }
    }
}

// == Hit Rate ==
/// Returns hits / (hits + misses), or 0.0 if no requests have been made.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
