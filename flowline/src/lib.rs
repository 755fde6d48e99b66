// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Flowline
//!
//! A composable data-processing pipeline runtime: build, execute, and
//! observe multi-stage transformation workflows over finite collections
//! (batch mode) or incremental streams (streaming mode), with bounded
//! concurrency, partial-failure policies, cooperative early termination,
//! and per-stage telemetry.
//!
//! ## Architecture
//!
//! - **[`application`]**: the engines: [`Pipeline`] (batch),
//!   [`StreamingPipeline`], the list adapter, and the batch/stream
//!   adapters.
//! - **[`infrastructure`]**: the runtime underneath: lazy-sequence
//!   operators ([`stream`]), the progress tracker ([`progress`]), and
//!   logging with payload sanitization ([`logging`]).
//! - **`flowline-domain`**: the shared domain model: stage traits,
//!   outcomes, metadata, state, events, and errors; re-exported here as
//!   [`domain`].
//!
//! ## Usage Examples
//!
//! ### Batch
//!
//! ```
//! use flowline::Pipeline;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("doubler")
//!     .map("double", |n: i64| async move { Ok(n * 2) })
//!     .unwrap();
//! let outcome = pipeline.execute(vec![1, 2, 3]).await;
//! assert_eq!(outcome.data(), Some(&vec![2, 4, 6]));
//! # });
//! ```
//!
//! ### Streaming
//!
//! ```
//! use flowline::StreamingPipeline;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let pipeline = StreamingPipeline::<i64, i64>::start("doubler")
//!     .map("double", |n| async move { Ok(n * 2) })
//!     .unwrap()
//!     .take("first_two", 2)
//!     .unwrap();
//! let doubled = pipeline.execute_to_vec(vec![1, 2, 3, 4]).await.unwrap();
//! assert_eq!(doubled, vec![2, 4]);
//! # });
//! ```

pub mod application;
pub mod infrastructure;

/// The shared domain model.
pub use flowline_domain as domain;

pub use application::{
    categorize, categorize_stage, categorize_streaming_stage, hybrid, recommend, to_batch, to_streaming, BatchStage,
    BatchedStage, BranchStage, FilterStage, FlatMapStage, FlattenStage, HybridStage, ListItemContext, ListOptions,
    ListStage, Pipeline, StreamedStage, StreamingPipeline, StreamingRecommendation,
};
pub use infrastructure::logging::{
    self as logging, init_logging, LogFormat, LogLevel, LoggingConfig, SanitizerConfig,
};
pub use infrastructure::progress::{self as progress, OverallProgress, ProgressTracker, StepProgress, StepStatus};
pub use infrastructure::stream::{self as stream, IntoItemStream, ParallelOptions};

pub use flowline_domain::{
    codes, AccumulatedState, ErrorStrategy, FnStage, FnStreamingStage, ItemStream, ProgressEvent, ProgressEventKind,
    ProgressSink, RetryPolicy, RunContext, Stage, StageCategory, StageContext, StageError, StageMetadata,
    StageOutcome, StageReport, StageResult, StreamContext, StreamingStage, StreamingState, WindowConfig,
};
