// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the directory cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding server chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `directory_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `kind`: group, user, membership, state
//! - `operation`: upsert, drop, reset, lookup, search
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a sync primitive outcome
pub fn record_sync_operation(kind: &str, operation: &str, status: &str) {
    counter!(
        "directory_cache_sync_operations_total",
        "kind" => kind.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record rows written by a bulk upsert
pub fn record_rows_synced(kind: &str, count: usize) {
    counter!(
        "directory_cache_rows_synced_total",
        "kind" => kind.to_string()
    )
    .increment(count as u64);
}

/// Record operation latency
pub fn record_latency(component: &str, operation: &str, duration: Duration) {
    histogram!(
        "directory_cache_operation_seconds",
        "component" => component.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a read served to the directory front end
pub fn record_read(operation: &str, status: &str) {
    counter!(
        "directory_cache_reads_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-PROCESS CACHES
// ═══════════════════════════════════════════════════════════════════════════

/// Record a cache lookup outcome (hit, miss, stale)
pub fn record_cache_lookup(cache: &str, outcome: &str) {
    counter!(
        "directory_cache_lookups_total",
        "cache" => cache.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set current entry count of a named cache
pub fn set_cache_entries(cache: &str, count: usize) {
    gauge!(
        "directory_cache_entries",
        "cache" => cache.to_string()
    )
    .set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// CURSORS & RESET STATE
// ═══════════════════════════════════════════════════════════════════════════

/// Record a cursor close, `outcome` is clean or failed
pub fn record_cursor_closed(cursor: &str, outcome: &str) {
    counter!(
        "directory_cache_cursors_closed_total",
        "cursor" => cursor.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set reset flag (1 = store must be resynchronized before reads)
pub fn set_reset_required(required: bool) {
    gauge!("directory_cache_reset_required").set(if required { 1.0 } else { 0.0 });
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    component: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.component, self.operation, self.start.elapsed());
    }
}
