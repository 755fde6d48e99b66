// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Streaming Pipeline
//!
//! The batch pipeline's compositional surface implemented over lazy,
//! pull-based sequences. Stages are function-composed at construction;
//! nothing runs until the consumer pulls the output sequence.
//!
//! ## Composition
//!
//! Each added stage wraps its predecessor's output stream. The stage's
//! view of prior state is the [`StreamingState`]: `accumulated` returns
//! explicitly checkpointed snapshots, `stream` yields a retained stage's
//! consume-once sequence, and `materialize` converts one into a cached
//! snapshot. Checkpointing is explicit: `checkpoint(key)` materializes at
//! that point, `retain(key)` tees items into a side buffer without
//! blocking the flow.
//!
//! ## Early Termination
//!
//! The consumer aborts by dropping the output sequence; the drop travels
//! up the operator chain, so every upstream operator and the source run
//! their cleanup. `take`, `take_while`, and `skip_while` stop pulling
//! their source once their condition settles.
//!
//! ## Failure Semantics
//!
//! A transform error terminates the sequence at the consumer's pull
//! point: downstream operators see no further items, upstream cleanup
//! runs, and the error carries the originating stage's message.
//!
//! ## Telemetry
//!
//! Stage lifecycle events are logged with component `streaming-pipeline`
//! as consumption proceeds; when a tracker is attached, step and item
//! events are published into it. One caution on `materialize`: a stage
//! must not materialize a key retained downstream of itself before its
//! own input has flowed, or the pull cycle deadlocks.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_stream::try_stream;
use futures::future::BoxFuture;
use futures::TryStreamExt;
use uuid::Uuid;

use flowline_domain::{
    FnStreamingStage, ItemStream, ProgressEvent, ProgressSink, RunContext, StageError, StageResult, StreamContext,
    StreamingStage, StreamingState,
};

use crate::infrastructure::progress::ProgressTracker;
use crate::infrastructure::stream::{
    buffer_time, buffer_until, filter as filter_op, flat_map as flat_map_op, map as map_op, parallel_map,
    skip as skip_op, skip_while as skip_while_op, take as take_op, take_while as take_while_op, tap as tap_op,
    window as window_op, IntoItemStream, ParallelOptions,
};
use crate::infrastructure::stream::operators::batch as batch_op;

type BuildFn<I, O> = Arc<dyn Fn(ItemStream<I>, StreamContext) -> ItemStream<O> + Send + Sync>;
type ContextBuilder = Arc<dyn Fn() -> BoxFuture<'static, StageResult<RunContext>> + Send + Sync>;

#[derive(Clone)]
struct StepInfo {
    key: String,
    name: String,
}

/// Closes a retained side buffer on every exit path.
struct BufferCloseGuard(Arc<flowline_domain::entities::SharedBuffer>);

impl Drop for BufferCloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// A named chain of lazy-sequence transformers from item type `I` to item
/// type `O`.
pub struct StreamingPipeline<I, O> {
    name: String,
    steps: Vec<StepInfo>,
    context_builder: Option<ContextBuilder>,
    tracker: Option<ProgressTracker>,
    build_fn: BuildFn<I, O>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> Clone for StreamingPipeline<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            steps: self.steps.clone(),
            context_builder: self.context_builder.clone(),
            tracker: self.tracker.clone(),
            build_fn: Arc::clone(&self.build_fn),
            _types: PhantomData,
        }
    }
}

impl<I> StreamingPipeline<I, I>
where
    I: Send + 'static,
{
    /// Starts an empty streaming pipeline over item type `I`.
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            context_builder: None,
            tracker: None,
            build_fn: Arc::new(|input, _ctx| input),
            _types: PhantomData,
        }
    }

    /// Starts an empty streaming pipeline with a context builder, invoked
    /// once per execution.
    pub fn start_with_context<F, Fut>(name: impl Into<String>, builder: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<RunContext>> + Send + 'static,
    {
        let mut pipeline = Self::start(name);
        pipeline.context_builder = Some(Arc::new(move || Box::pin(builder())));
        pipeline
    }
}

impl<I, O> StreamingPipeline<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Appends a streaming stage under a unique key.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error on a duplicate key.
    pub fn add<P, S>(self, key: impl Into<String>, stage: S) -> StageResult<StreamingPipeline<I, P>>
    where
        P: Send + 'static,
        S: StreamingStage<O, P> + 'static,
    {
        let key = key.into();
        if self.steps.iter().any(|step| step.key == key) {
            return Err(StageError::invalid_config(format!("duplicate stage key: {}", key)));
        }
        let stage = Arc::new(stage);
        let stage_name = stage.name().to_string();
        let previous = Arc::clone(&self.build_fn);
        let instrumented_name = stage_name.clone();

        let build_fn: BuildFn<I, P> = Arc::new(move |input, ctx| {
            let upstream = previous(input, ctx.clone());
            let output = stage.apply(upstream, ctx.clone());
            instrument_stage(output, instrumented_name.clone(), ctx)
        });

        let mut steps = self.steps;
        steps.push(StepInfo {
            key,
            name: stage_name,
        });
        Ok(StreamingPipeline {
            name: self.name,
            steps,
            context_builder: self.context_builder,
            tracker: self.tracker,
            build_fn,
            _types: PhantomData,
        })
    }

    /// Attaches a progress tracker.
    pub fn with_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// The pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stages in the chain.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Stage keys in chain order.
    pub fn keys(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.key.as_str()).collect()
    }

    /// Returns the composed transformer as a function; no work is
    /// performed until the returned sequence is consumed.
    pub fn build(&self) -> impl Fn(ItemStream<I>) -> ItemStream<O> + Send + Sync + 'static {
        let pipeline = self.clone();
        move |input| pipeline.execute(input)
    }

    /// Runs the chain over the coerced input, returning the lazy output
    /// sequence.
    pub fn execute<S>(&self, input: S) -> ItemStream<O>
    where
        S: IntoItemStream<I>,
    {
        let build_fn = Arc::clone(&self.build_fn);
        let context_builder = self.context_builder.clone();
        let tracker = self.tracker.clone();
        let name = self.name.clone();
        let total_steps = self.steps.len();
        let input = input.into_item_stream();

        Box::pin(try_stream! {
            let run = match &context_builder {
                Some(builder) => builder().await?,
                None => RunContext::empty(),
            };
            let trace_id = Uuid::new_v4().to_string();
            let state = Arc::new(StreamingState::new());
            let mut ctx = StreamContext::new(Arc::clone(&state), run, trace_id.clone());
            if let Some(tracker) = &tracker {
                tracker.begin_run(total_steps);
                tracker.publish(&ProgressEvent::pipeline_start());
                ctx = ctx.with_progress(Arc::new(tracker.clone()) as Arc<dyn ProgressSink>);
            }
            tracing::info!(
                component = "streaming-pipeline",
                event = "pipeline_start",
                trace_id = %trace_id,
                pipeline = %name,
                stages = total_steps,
                "pipeline consumption started"
            );
            let started = Instant::now();

            let source = count_source(input, name.clone(), tracker.clone());
            let mut output = build_fn(source, ctx);
            let mut yielded = 0u64;
            loop {
                match output.try_next().await {
                    Ok(Some(item)) => {
                        yielded += 1;
                        yield item;
                    }
                    Ok(None) => {
                        if let Some(tracker) = &tracker {
                            tracker.publish(&ProgressEvent::pipeline_complete());
                        }
                        tracing::info!(
                            component = "streaming-pipeline",
                            event = "pipeline_complete",
                            trace_id = %trace_id,
                            pipeline = %name,
                            duration_ms = started.elapsed().as_millis() as u64,
                            items = yielded,
                            "pipeline consumption completed"
                        );
                        break;
                    }
                    Err(error) => {
                        if let Some(tracker) = &tracker {
                            tracker.publish(&ProgressEvent::pipeline_error(&error));
                        }
                        tracing::error!(
                            component = "streaming-pipeline",
                            event = "pipeline_failed",
                            trace_id = %trace_id,
                            pipeline = %name,
                            code = %error.code(),
                            error = %error.message(),
                            "pipeline consumption failed"
                        );
                        Err::<O, StageError>(error)?;
                    }
                }
            }
        })
    }

    /// Runs the chain and materializes the output.
    pub async fn execute_to_vec<S>(&self, input: S) -> StageResult<Vec<O>>
    where
        S: IntoItemStream<I>,
    {
        self.execute(input).try_collect().await
    }

    /// Runs the chain, applying a consumer to each output item.
    pub async fn for_each<S, F, Fut>(&self, input: S, mut consumer: F) -> StageResult<()>
    where
        S: IntoItemStream<I>,
        F: FnMut(O) -> Fut,
        Fut: Future<Output = StageResult<()>>,
    {
        let mut output = self.execute(input);
        while let Some(item) = output.try_next().await? {
            consumer(item).await?;
        }
        Ok(())
    }

    /// Runs the chain, folding output items into an accumulator.
    pub async fn reduce<S, A, F, Fut>(&self, input: S, init: A, mut fold: F) -> StageResult<A>
    where
        S: IntoItemStream<I>,
        F: FnMut(A, O) -> Fut,
        Fut: Future<Output = StageResult<A>>,
    {
        let mut output = self.execute(input);
        let mut accumulator = init;
        while let Some(item) = output.try_next().await? {
            accumulator = fold(accumulator, item).await?;
        }
        Ok(accumulator)
    }

    /// Appends a sequential per-item map stage.
    pub fn map<U, F, Fut>(self, key: impl Into<String>, f: F) -> StageResult<StreamingPipeline<I, U>>
    where
        U: Send + 'static,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<U>> + Send + 'static,
    {
        let key = key.into();
        let f = Arc::new(f);
        let stage = FnStreamingStage::new(format!("map({})", key), move |input: ItemStream<O>, _ctx| {
            let f = Arc::clone(&f);
            map_op(input, move |item| {
                let f = Arc::clone(&f);
                async move { f(item).await }
            })
        });
        self.add(key, stage)
    }

    /// Appends a bounded-concurrency map stage; ordered output by default.
    pub fn map_parallel<U, F, Fut>(
        self,
        key: impl Into<String>,
        f: F,
        options: ParallelOptions,
    ) -> StageResult<StreamingPipeline<I, U>>
    where
        U: Send + 'static,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<U>> + Send + 'static,
    {
        let key = key.into();
        let f = Arc::new(f);
        let stage = FnStreamingStage::new(format!("map_parallel({})", key), move |input: ItemStream<O>, _ctx| {
            let f = Arc::clone(&f);
            parallel_map(input, move |item, _index| f(item), options)
        });
        self.add(key, stage)
    }

    /// Appends an order-preserving filter stage.
    pub fn filter<F, Fut>(self, key: impl Into<String>, predicate: F) -> StageResult<StreamingPipeline<I, O>>
    where
        O: Clone,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<bool>> + Send + 'static,
    {
        let key = key.into();
        let predicate = Arc::new(predicate);
        let stage = FnStreamingStage::new(format!("filter({})", key), move |input: ItemStream<O>, _ctx| {
            let predicate = Arc::clone(&predicate);
            filter_op(input, move |item| {
                let predicate = Arc::clone(&predicate);
                async move { predicate(item).await }
            })
        });
        self.add(key, stage)
    }

    /// Appends a one-to-many stage; outputs concatenate in source order.
    pub fn flat_map<U, F, Fut>(self, key: impl Into<String>, f: F) -> StageResult<StreamingPipeline<I, U>>
    where
        U: Send + 'static,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<Vec<U>>> + Send + 'static,
    {
        let key = key.into();
        let f = Arc::new(f);
        let stage = FnStreamingStage::new(format!("flat_map({})", key), move |input: ItemStream<O>, _ctx| {
            let f = Arc::clone(&f);
            flat_map_op(input, move |item| {
                let f = Arc::clone(&f);
                async move { f(item).await }
            })
        });
        self.add(key, stage)
    }

    /// Appends a side-effect stage; items pass through unchanged.
    pub fn tap<F, Fut>(self, key: impl Into<String>, effect: F) -> StageResult<StreamingPipeline<I, O>>
    where
        O: Clone,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<()>> + Send + 'static,
    {
        let key = key.into();
        let effect = Arc::new(effect);
        let stage = FnStreamingStage::new(format!("tap({})", key), move |input: ItemStream<O>, _ctx| {
            let effect = Arc::clone(&effect);
            tap_op(input, move |item| {
                let effect = Arc::clone(&effect);
                async move { effect(item).await }
            })
        });
        self.add(key, stage)
    }

    /// Appends a fixed-size grouping stage.
    pub fn batch(self, key: impl Into<String>, size: usize) -> StageResult<StreamingPipeline<I, Vec<O>>> {
        let key = key.into();
        let stage = FnStreamingStage::new(format!("batch({})", key), move |input: ItemStream<O>, _ctx| {
            batch_op(input, size)
        });
        self.add(key, stage)
    }

    /// Appends a tumbling window stage.
    pub fn window(self, key: impl Into<String>, window_size: usize) -> StageResult<StreamingPipeline<I, Vec<O>>>
    where
        O: Clone,
    {
        self.window_with_slide(key, window_size, window_size)
    }

    /// Appends a window stage with an explicit slide size.
    pub fn window_with_slide(
        self,
        key: impl Into<String>,
        window_size: usize,
        slide_size: usize,
    ) -> StageResult<StreamingPipeline<I, Vec<O>>>
    where
        O: Clone,
    {
        let key = key.into();
        let stage = FnStreamingStage::new(format!("window({})", key), move |input: ItemStream<O>, _ctx| {
            window_op(input, window_size, slide_size)
        });
        self.add(key, stage)
    }

    /// Appends a time-bounded buffering stage with an optional size cap.
    pub fn buffer_time(
        self,
        key: impl Into<String>,
        window: Duration,
        max_size: Option<usize>,
    ) -> StageResult<StreamingPipeline<I, Vec<O>>> {
        let key = key.into();
        let stage = FnStreamingStage::new(format!("buffer_time({})", key), move |input: ItemStream<O>, _ctx| {
            buffer_time(input, window, max_size)
        });
        self.add(key, stage)
    }

    /// Appends a predicate-driven buffering stage.
    pub fn buffer_until<F, Fut>(self, key: impl Into<String>, predicate: F) -> StageResult<StreamingPipeline<I, Vec<O>>>
    where
        O: Clone,
        F: Fn(Vec<O>, O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<bool>> + Send + 'static,
    {
        let key = key.into();
        let predicate = Arc::new(predicate);
        let stage = FnStreamingStage::new(format!("buffer_until({})", key), move |input: ItemStream<O>, _ctx| {
            let predicate = Arc::clone(&predicate);
            buffer_until(input, move |buffer, item| {
                let predicate = Arc::clone(&predicate);
                async move { predicate(buffer, item).await }
            })
        });
        self.add(key, stage)
    }

    /// Appends a stage yielding at most the first `n` items, cancelling
    /// the source afterwards.
    pub fn take(self, key: impl Into<String>, n: usize) -> StageResult<StreamingPipeline<I, O>> {
        let key = key.into();
        let stage =
            FnStreamingStage::new(format!("take({})", key), move |input: ItemStream<O>, _ctx| take_op(input, n));
        self.add(key, stage)
    }

    /// Appends a stage discarding the first `n` items.
    pub fn skip(self, key: impl Into<String>, n: usize) -> StageResult<StreamingPipeline<I, O>> {
        let key = key.into();
        let stage =
            FnStreamingStage::new(format!("skip({})", key), move |input: ItemStream<O>, _ctx| skip_op(input, n));
        self.add(key, stage)
    }

    /// Appends a stage yielding items while the predicate holds.
    pub fn take_while<F, Fut>(self, key: impl Into<String>, predicate: F) -> StageResult<StreamingPipeline<I, O>>
    where
        O: Clone,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<bool>> + Send + 'static,
    {
        let key = key.into();
        let predicate = Arc::new(predicate);
        let stage = FnStreamingStage::new(format!("take_while({})", key), move |input: ItemStream<O>, _ctx| {
            let predicate = Arc::clone(&predicate);
            take_while_op(input, move |item| {
                let predicate = Arc::clone(&predicate);
                async move { predicate(item).await }
            })
        });
        self.add(key, stage)
    }

    /// Appends a stage discarding items while the predicate holds.
    pub fn skip_while<F, Fut>(self, key: impl Into<String>, predicate: F) -> StageResult<StreamingPipeline<I, O>>
    where
        O: Clone,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<bool>> + Send + 'static,
    {
        let key = key.into();
        let predicate = Arc::new(predicate);
        let stage = FnStreamingStage::new(format!("skip_while({})", key), move |input: ItemStream<O>, _ctx| {
            let predicate = Arc::clone(&predicate);
            skip_while_op(input, move |item| {
                let predicate = Arc::clone(&predicate);
                async move { predicate(item).await }
            })
        });
        self.add(key, stage)
    }
}

impl<I, O> StreamingPipeline<I, O>
where
    I: Send + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// Appends an explicit checkpoint: the stream is materialized here,
    /// stored as a snapshot under the key, and re-emitted downstream.
    pub fn checkpoint(self, key: impl Into<String>) -> StageResult<StreamingPipeline<I, O>> {
        let key = key.into();
        let stage_key = key.clone();
        let stage = FnStreamingStage::new(format!("checkpoint({})", key), move |input: ItemStream<O>, ctx| {
            let stage_key = stage_key.clone();
            Box::pin(try_stream! {
                let items: Vec<O> = input.try_collect().await?;
                ctx.state().insert_snapshot(&stage_key, items.clone())?;
                for item in items {
                    yield item;
                }
            }) as ItemStream<O>
        });
        self.add(key, stage)
    }

    /// Appends a retain tee: items flow through unchanged while clones
    /// land in a side buffer readable once via the state's stream view.
    pub fn retain(self, key: impl Into<String>) -> StageResult<StreamingPipeline<I, O>> {
        let key = key.into();
        let stage_key = key.clone();
        let stage = FnStreamingStage::new(format!("retain({})", key), move |input: ItemStream<O>, ctx| {
            let buffer = ctx.state().register_buffer(&stage_key);
            Box::pin(try_stream! {
                let guard = BufferCloseGuard(Arc::clone(&buffer));
                let mut input = input;
                while let Some(item) = input.try_next().await? {
                    buffer.push(Arc::new(item.clone()));
                    yield item;
                }
                drop(guard);
            }) as ItemStream<O>
        });
        self.add(key, stage)
    }
}

/// Wraps a stage's output with lifecycle telemetry. Runs lazily: the
/// `stage_start` event fires at the consumer's first pull.
fn instrument_stage<T: Send + 'static>(source: ItemStream<T>, stage_name: String, ctx: StreamContext) -> ItemStream<T> {
    Box::pin(try_stream! {
        let span_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        tracing::debug!(
            component = "streaming-pipeline",
            event = "stage_start",
            trace_id = %ctx.trace_id(),
            span_id = %span_id,
            stage_name = %stage_name,
            "stage consumption started"
        );
        if let Some(sink) = ctx.progress() {
            sink.publish(&ProgressEvent::step_start(&stage_name));
        }
        let mut yielded = 0u64;
        let mut source = source;
        loop {
            match source.try_next().await {
                Ok(Some(item)) => {
                    yielded += 1;
                    if let Some(sink) = ctx.progress() {
                        sink.publish(&ProgressEvent::item_yielded(&stage_name));
                    }
                    yield item;
                }
                Ok(None) => {
                    tracing::debug!(
                        component = "streaming-pipeline",
                        event = "stage_complete",
                        trace_id = %ctx.trace_id(),
                        span_id = %span_id,
                        stage_name = %stage_name,
                        duration_ms = started.elapsed().as_millis() as u64,
                        items = yielded,
                        "stage consumption completed"
                    );
                    if let Some(sink) = ctx.progress() {
                        sink.publish(&ProgressEvent::step_complete(&stage_name));
                    }
                    break;
                }
                Err(error) => {
                    tracing::error!(
                        component = "streaming-pipeline",
                        event = "stage_failed",
                        trace_id = %ctx.trace_id(),
                        span_id = %span_id,
                        stage_name = %stage_name,
                        duration_ms = started.elapsed().as_millis() as u64,
                        code = %error.code(),
                        error = %error.message(),
                        "stage consumption failed"
                    );
                    if let Some(sink) = ctx.progress() {
                        sink.publish(&ProgressEvent::step_error(&stage_name, &error));
                    }
                    Err::<T, StageError>(error)?;
                }
            }
        }
    })
}

/// Counts source items into the tracker as they are pulled.
fn count_source<T: Send + 'static>(source: ItemStream<T>, pipeline_name: String, tracker: Option<ProgressTracker>) -> ItemStream<T> {
    let Some(tracker) = tracker else {
        return source;
    };
    Box::pin(try_stream! {
        let mut source = source;
        let mut index = 0usize;
        while let Some(item) = source.try_next().await? {
            tracker.publish(&ProgressEvent::item_processed(&pipeline_name, index));
            index += 1;
            yield item;
        }
    })
}
