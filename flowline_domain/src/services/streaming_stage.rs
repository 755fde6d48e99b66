// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Streaming Stage Service
//!
//! The seam between the streaming pipeline and its stages. A streaming
//! stage is a lazy-sequence transformer: it receives the upstream item
//! stream and the stream context, and returns the downstream item stream.
//! No work happens until the consumer pulls.
//!
//! ## Lazy Sequences
//!
//! [`ItemStream`] is a pull-based, single-consumer sequence of fallible
//! items. Cooperative early termination is expressed through ownership:
//! dropping a stream drops its source, which runs producer cleanup on
//! every exit path. Restart is not generally supported; splitting a
//! sequence requires an explicit materialization through the streaming
//! state.
//!
//! ## Failure Semantics
//!
//! A transform error travels downstream as the stream's final item; the
//! consumer observes it at its pull point and upstream operators are
//! dropped, running their cleanup.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

use crate::entities::streaming_state::StreamingState;
use crate::entities::RunContext;
use crate::error::StageResult;
use crate::events::ProgressSink;
use crate::value_objects::StageCategory;

/// Pull-based, single-consumer lazy sequence of fallible items.
pub type ItemStream<T> = Pin<Box<dyn Stream<Item = StageResult<T>> + Send>>;

/// The environment threaded through a streaming pipeline execution:
/// streaming state, run context, trace id, and the optional progress sink.
#[derive(Clone)]
pub struct StreamContext {
    state: Arc<StreamingState>,
    run: RunContext,
    trace_id: String,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl StreamContext {
    /// Builds a context for one pipeline execution.
    pub fn new(state: Arc<StreamingState>, run: RunContext, trace_id: impl Into<String>) -> Self {
        Self {
            state,
            run,
            trace_id: trace_id.into(),
            progress: None,
        }
    }

    /// Attaches the progress sink lifecycle events are published to.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Snapshot and stream views onto prior-stage outputs.
    pub fn state(&self) -> &Arc<StreamingState> {
        &self.state
    }

    /// The user-supplied run-scoped record.
    pub fn run(&self) -> &RunContext {
        &self.run
    }

    /// The trace id correlating all events of this execution.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// The attached progress sink, when the pipeline carries a tracker.
    pub fn progress(&self) -> Option<&Arc<dyn ProgressSink>> {
        self.progress.as_ref()
    }
}

impl std::fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamContext").field("trace_id", &self.trace_id).finish()
    }
}

/// A lazy-sequence transformer: one stage of a streaming pipeline.
pub trait StreamingStage<In, Out>: Send + Sync
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Human-readable stage name, used in telemetry and categorization.
    fn name(&self) -> &str;

    /// Explicit category, when the stage declares one; heuristics apply
    /// otherwise.
    fn category(&self) -> Option<StageCategory> {
        None
    }

    /// Wraps the upstream sequence. Must not consume `input` eagerly.
    fn apply(&self, input: ItemStream<In>, ctx: StreamContext) -> ItemStream<Out>;
}

type ApplyFn<In, Out> = dyn Fn(ItemStream<In>, StreamContext) -> ItemStream<Out> + Send + Sync;

/// A streaming stage built from a closure, for operators that need no
/// state of their own.
pub struct FnStreamingStage<In, Out> {
    name: String,
    category: Option<StageCategory>,
    apply: Arc<ApplyFn<In, Out>>,
}

impl<In, Out> FnStreamingStage<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Wraps a transformer closure under the given name.
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(ItemStream<In>, StreamContext) -> ItemStream<Out> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            category: None,
            apply: Arc::new(apply),
        }
    }

    /// Declares an explicit category for this stage.
    pub fn with_category(mut self, category: StageCategory) -> Self {
        self.category = Some(category);
        self
    }
}

impl<In, Out> StreamingStage<In, Out> for FnStreamingStage<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Option<StageCategory> {
        self.category
    }

    fn apply(&self, input: ItemStream<In>, ctx: StreamContext) -> ItemStream<Out> {
        (self.apply)(input, ctx)
    }
}
