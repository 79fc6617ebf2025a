// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for blob-tree.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding server is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `blob_tree_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `kind`: blob, container
//! - `operation`: exists, get_data, set_data, get_members, delete
//! - `status`: success, error, conflict

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

use crate::storage::traits::StorageError;

/// Record the outcome of a handle operation
pub fn record_operation(kind: &str, operation: &str, status: &str) {
    counter!(
        "blob_tree_operations_total",
        "kind" => kind.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(kind: &str, operation: &str, duration: Duration) {
    histogram!(
        "blob_tree_operation_seconds",
        "kind" => kind.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the size of a blob written by `set_data`
pub fn record_blob_bytes(bytes: usize) {
    histogram!("blob_tree_blob_bytes").record(bytes as f64);
}

/// Record how many commands one transaction staged
pub fn record_transaction_size(ops: usize) {
    histogram!("blob_tree_transaction_ops").record(ops as f64);
}

/// Record a commit rejected because a watched key changed
pub fn record_conflict(kind: &str, operation: &str) {
    counter!(
        "blob_tree_transaction_conflicts_total",
        "kind" => kind.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Times one operation and records latency plus outcome when finished.
pub struct OperationTimer {
    kind: &'static str,
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn start(kind: &'static str, operation: &'static str) -> Self {
        Self { kind, operation, start: Instant::now() }
    }

    /// Record the result and hand it back unchanged.
    pub fn finish<T>(self, result: Result<T, StorageError>) -> Result<T, StorageError> {
        let status = match &result {
            Ok(_) => "success",
            Err(e) if e.is_conflict() => {
                record_conflict(self.kind, self.operation);
                "conflict"
            }
            Err(_) => "error",
        };
        record_operation(self.kind, self.operation, status);
        record_latency(self.kind, self.operation, self.start.elapsed());
        result
    }
}
