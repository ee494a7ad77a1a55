// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for kv-repo.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `kv_repo_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `repo`: repository name
//! - `operation`: save, get, get_all, delete, list, index op names
//! - `status`: ok, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a cache hit for a repository read
pub fn record_cache_hit(repo: &str) {
    counter!(
        "kv_repo_cache_hits_total",
        "repo" => repo.to_string()
    )
    .increment(1);
}

/// Record a cache miss for a repository read
pub fn record_cache_miss(repo: &str) {
    counter!(
        "kv_repo_cache_misses_total",
        "repo" => repo.to_string()
    )
    .increment(1);
}

/// Record entries removed by an eviction sweep tick
pub fn record_evictions(cache: &str, count: usize) {
    counter!(
        "kv_repo_cache_evictions_total",
        "cache" => cache.to_string()
    )
    .increment(count as u64);
}

/// Set current cache entry count
pub fn set_cache_entries(cache: &str, count: usize) {
    gauge!(
        "kv_repo_cache_entries",
        "cache" => cache.to_string()
    )
    .set(count as f64);
}

/// Record a backing-store round trip
pub fn record_store_op(operation: &str, status: &str) {
    counter!(
        "kv_repo_store_ops_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record repository operation latency
pub fn record_op_latency(repo: &str, operation: &str, duration: Duration) {
    histogram!(
        "kv_repo_op_duration_seconds",
        "repo" => repo.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// DATA QUALITY - Payloads the repository refused to surface
// ═══════════════════════════════════════════════════════════════════════════

/// Record a payload dropped from a batch because it failed to deserialize
pub fn record_dropped_payload(repo: &str) {
    counter!(
        "kv_repo_dropped_payloads_total",
        "repo" => repo.to_string()
    )
    .increment(1);
}

/// Record records removed by an integrity cleanup pass
pub fn record_cleanup_removed(repo: &str, count: usize) {
    counter!(
        "kv_repo_cleanup_removed_total",
        "repo" => repo.to_string()
    )
    .increment(count as u64);
}

// ═══════════════════════════════════════════════════════════════════════════
// INDEX PROTOCOL - Read-modify-write outcomes
// ═══════════════════════════════════════════════════════════════════════════

/// Record an index mutation outcome (`applied` or `noop`)
pub fn record_index_op(operation: &str, outcome: &str) {
    counter!(
        "kv_repo_index_ops_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    repo: String,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(repo: &str, operation: &'static str) -> Self {
        Self {
            repo: repo.to_string(),
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_op_latency(&self.repo, self.operation, self.start.elapsed());
    }
}

/// Convenience macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($repo:expr, $op:expr) => {
        $crate::metrics::LatencyTimer::new($repo, $op)
    };
}
