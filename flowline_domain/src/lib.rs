// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Flowline Domain
//!
//! The domain model of the Flowline composable data-processing pipeline:
//! the types and trait seams shared by the batch and streaming engines,
//! independent of any runtime, logging backend, or adapter concern.
//!
//! ## Module Structure
//!
//! - [`entities`]: execution-scoped objects: stage metadata and outcomes,
//!   the execute-time context with its accumulated state, and the
//!   streaming state with snapshot/stream views.
//! - [`value_objects`]: immutable, self-validating values: retry policy,
//!   concurrency limit, batch size, window configuration, and the
//!   strategy/category vocabulary.
//! - [`services`]: stateless seams: the batch [`Stage`](services::Stage)
//!   trait, the streaming
//!   [`StreamingStage`](services::StreamingStage) trait, and the RFC3339
//!   datetime serde helper.
//! - [`events`]: progress events published by the engines and consumed
//!   through the [`ProgressSink`](events::ProgressSink) seam.
//! - [`error`]: the coded [`StageError`] and its classification
//!   heuristics.
//!
//! ## Business Rules and Invariants
//!
//! - Stage keys are unique across a chain; state values are inserted
//!   exactly once and never mutated.
//! - Every stage invocation yields exactly one of data or error, with
//!   metadata always present; `duration_ms` is derived and non-negative.
//! - List counters never exceed the collection total.
//! - Constructor validation (`max_attempts ≥ 1`, positive sizes and
//!   limits) runs once; the engines never re-check.
//! - A lazy sequence has a single consumer; splitting one requires an
//!   explicit materialization.

pub mod entities;
pub mod error;
pub mod events;
pub mod services;
pub mod value_objects;

pub use entities::{
    AccumulatedState, ExecutionStrategy, ItemTimings, ListOperationMetadata, RunContext, StageContext, StageMetadata,
    StageOutcome, StageReport, StateValue, StreamingState,
};
pub use error::{codes, ItemFailure, StageError, StageResult};
pub use events::{ProgressEvent, ProgressEventKind, ProgressSink};
pub use services::{FnStage, FnStreamingStage, ItemStream, Stage, StreamContext, StreamingStage};
pub use value_objects::{
    BatchSize, ConcurrencyLimit, ErrorStrategy, RetryPolicy, StageCategory, WindowConfig, WindowRegime,
};
