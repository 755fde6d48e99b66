// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Metadata
//!
//! Per-invocation telemetry attached to every stage outcome: wall-clock
//! start and end, derived duration, trace/span correlation ids, and the
//! list-operation aggregates when the stage processed a collection.
//!
//! ## Overview
//!
//! Metadata is built by the engines, never by stage bodies. A stage body
//! only contributes the optional [`ListOperationMetadata`] through its
//! report; the engine stamps timing and correlation ids around it.
//!
//! ## Invariants
//!
//! - `duration_ms = end_time − start_time ≥ 0` (clamped at zero against
//!   clock skew)
//! - `success_count + failure_count + skipped_count ≤ total_items`, with
//!   equality in FAIL_FAST mode only when every item was reached
//! - `concurrency_limit` is present only for parallel execution
//!
//! ## Item Timing Aggregates
//!
//! Per-item durations are summarized as min/max/avg plus the 50th, 95th,
//! and 99th percentiles in milliseconds. Percentiles use nearest-rank
//! selection at `ceil(p · N)`, so a single-item collection reports that
//! item's duration for every percentile.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::datetime_serde;

/// Whether a collection was processed item-by-item or with bounded
/// concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStrategy::Sequential => write!(f, "sequential"),
            ExecutionStrategy::Parallel => write!(f, "parallel"),
        }
    }
}

/// Aggregated per-item timing statistics in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemTimings {
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl ItemTimings {
    /// Computes timing aggregates from raw per-item durations.
    ///
    /// Returns `None` for an empty slice; aggregates over nothing are
    /// meaningless and omitted from metadata instead of zeroed.
    pub fn from_durations(durations: &[Duration]) -> Option<Self> {
        if durations.is_empty() {
            return None;
        }
        let mut millis: Vec<f64> = durations.iter().map(|d| d.as_nanos() as f64 / 1_000_000.0).collect();
        millis.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let sum: f64 = millis.iter().sum();
        Some(Self {
            min_ms: millis[0],
            max_ms: millis[millis.len() - 1],
            avg_ms: sum / millis.len() as f64,
            p50_ms: nearest_rank(&millis, 50),
            p95_ms: nearest_rank(&millis, 95),
            p99_ms: nearest_rank(&millis, 99),
        })
    }
}

/// Nearest-rank percentile over an ascending-sorted slice: the value at
/// rank `ceil(p · N / 100)`, 1-based.
fn nearest_rank(sorted_millis: &[f64], percentile: u32) -> f64 {
    let count = sorted_millis.len();
    let rank = ((f64::from(percentile) / 100.0) * count as f64).ceil() as usize;
    sorted_millis[rank.clamp(1, count) - 1]
}

/// Telemetry for a stage that processed a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListOperationMetadata {
    total_items: usize,
    success_count: usize,
    failure_count: usize,
    skipped_count: usize,
    execution_strategy: ExecutionStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    concurrency_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item_timings: Option<ItemTimings>,
}

impl ListOperationMetadata {
    /// Creates sequential list metadata.
    pub fn sequential(total_items: usize, success_count: usize, failure_count: usize, skipped_count: usize) -> Self {
        Self {
            total_items,
            success_count,
            failure_count,
            skipped_count,
            execution_strategy: ExecutionStrategy::Sequential,
            concurrency_limit: None,
            item_timings: None,
        }
    }

    /// Creates parallel list metadata; the concurrency limit is attached
    /// only in this mode.
    pub fn parallel(
        total_items: usize,
        success_count: usize,
        failure_count: usize,
        skipped_count: usize,
        concurrency_limit: usize,
    ) -> Self {
        Self {
            total_items,
            success_count,
            failure_count,
            skipped_count,
            execution_strategy: ExecutionStrategy::Parallel,
            concurrency_limit: Some(concurrency_limit),
            item_timings: None,
        }
    }

    /// Attaches per-item timing aggregates.
    pub fn with_item_timings(mut self, timings: Option<ItemTimings>) -> Self {
        self.item_timings = timings;
        self
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped_count
    }

    pub fn execution_strategy(&self) -> ExecutionStrategy {
        self.execution_strategy
    }

    pub fn concurrency_limit(&self) -> Option<usize> {
        self.concurrency_limit
    }

    pub fn item_timings(&self) -> Option<&ItemTimings> {
        self.item_timings.as_ref()
    }

    /// Checks the counting invariant: counts never exceed the total.
    pub fn counts_balanced(&self) -> bool {
        self.success_count + self.failure_count + self.skipped_count <= self.total_items
    }
}

/// Per-invocation stage telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMetadata {
    stage_name: String,
    #[serde(with = "datetime_serde")]
    start_time: DateTime<Utc>,
    #[serde(with = "datetime_serde")]
    end_time: DateTime<Utc>,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    list_metadata: Option<ListOperationMetadata>,
}

impl StageMetadata {
    /// Records metadata for an invocation spanning the given wall-clock
    /// interval. Duration is derived and clamped non-negative.
    pub fn record(stage_name: impl Into<String>, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        let duration_ms = (end_time - start_time).num_milliseconds().max(0) as u64;
        Self {
            stage_name: stage_name.into(),
            start_time,
            end_time,
            duration_ms,
            trace_id: None,
            span_id: None,
            list_metadata: None,
        }
    }

    /// Attaches the pipeline-invocation trace id.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Attaches the stage-invocation span id.
    pub fn with_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }

    /// Attaches list-operation telemetry.
    pub fn with_list_metadata(mut self, list_metadata: Option<ListOperationMetadata>) -> Self {
        self.list_metadata = list_metadata;
        self
    }

    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }

    pub fn list_metadata(&self) -> Option<&ListOperationMetadata> {
        self.list_metadata.as_ref()
    }
}
