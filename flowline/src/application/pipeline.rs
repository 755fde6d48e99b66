// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Batch Pipeline
//!
//! A named, typed, sequentially composed chain of stages over finite
//! collections, with accumulated state visible to downstream stages.
//!
//! ## Construction
//!
//! The builder carries the chain's input and output types at compile time;
//! adding a stage yields a new pipeline value whose output type is the
//! stage's. Keys are unique across the chain; a duplicate key is a
//! construction error. Runtime, the accumulated state is a keyed map of
//! opaque handles downcast by readers to their declared types.
//!
//! ## Execution Algorithm
//!
//! For each stage in order: generate a fresh span id, emit `stage_start`,
//! build the stage context from the current input, the accumulated state,
//! and the run context, then invoke the stage through the retry loop. A
//! failure emits `stage_failed` and returns the failure with the stage's
//! aggregate metadata; success emits `stage_complete`, writes the output
//! into accumulated state under the stage's key, and advances the input.
//! A panic escaping a stage body is contained and surfaced as a
//! non-retryable `UNHANDLED_ERROR`. The caller always receives a
//! [`StageOutcome`]; batch execution never raises.
//!
//! ## Retry
//!
//! A stage without a policy runs exactly once. With a policy, a failing
//! attempt is retried only while the error is retryable, attempts remain,
//! and the optional retryable-code whitelist admits the error's code.
//! Between attempts the engine sleeps `backoff · attempt` (linear) and
//! emits `stage_retry`.
//!
//! ## Per-Stage State Machine
//!
//! `PENDING → RUNNING → (COMPLETED | FAILED)`, with `RUNNING → RUNNING`
//! on retry. The progress tracker mirrors these transitions through the
//! step lifecycle events.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use uuid::Uuid;

use flowline_domain::{
    AccumulatedState, ProgressEvent, ProgressSink, RetryPolicy, RunContext, Stage, StageContext, StageError,
    StageMetadata, StageOutcome, StageReport, StageResult, StateValue,
};

use super::list_stage::{BatchStage, FilterStage, FlatMapStage, FlattenStage, ListOptions, ListStage};
use crate::infrastructure::progress::ProgressTracker;

type ErasedRunner = Arc<
    dyn Fn(StateValue, AccumulatedState, RunContext, Option<Arc<dyn ProgressSink>>) -> BoxFuture<'static, StageReport<StateValue>>
        + Send
        + Sync,
>;

type ContextBuilder = Arc<dyn Fn() -> BoxFuture<'static, StageResult<RunContext>> + Send + Sync>;

/// A type-erased stage entry in the chain.
struct ErasedStage {
    key: String,
    name: String,
    input_type: &'static str,
    retry: Option<RetryPolicy>,
    is_list: bool,
    concurrency: Option<usize>,
    runner: ErasedRunner,
}

/// A named, ordered chain of stages from input `I` to output `O`.
///
/// Pipelines are values: they hold no mutable state between executions,
/// and each execution builds a fresh run context and a fresh accumulated
/// state map.
pub struct Pipeline<I, O> {
    name: String,
    stages: Vec<ErasedStage>,
    context_builder: Option<ContextBuilder>,
    tracker: Option<ProgressTracker>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I> Pipeline<I, I>
where
    I: Send + Sync + Clone + 'static,
{
    /// Starts an empty pipeline whose input and output type is `I`.
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            context_builder: None,
            tracker: None,
            _types: PhantomData,
        }
    }

    /// Starts an empty pipeline with a context builder, invoked once per
    /// execution to produce the run-scoped record.
    pub fn start_with_context<F, Fut>(name: impl Into<String>, builder: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StageResult<RunContext>> + Send + 'static,
    {
        let mut pipeline = Self::start(name);
        pipeline.context_builder = Some(Arc::new(move || Box::pin(builder())));
        pipeline
    }
}

impl<I, O> Pipeline<I, O>
where
    I: Send + Sync + Clone + 'static,
    O: Send + Sync + Clone + 'static,
{
    /// Appends a stage under a unique key, advancing the pipeline's output
    /// type to the stage's.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error on a duplicate key.
    pub fn add<S>(self, key: impl Into<String>, stage: S) -> StageResult<Pipeline<I, S::Output>>
    where
        S: Stage<Input = O> + 'static,
    {
        let key = key.into();
        if self.stages.iter().any(|entry| entry.key == key) {
            return Err(StageError::invalid_config(format!("duplicate stage key: {}", key)));
        }

        let stage = Arc::new(stage);
        let name = stage.name().to_string();
        let retry = stage.retry_policy().cloned();
        let is_list = stage.is_list_operation();
        let concurrency = stage.concurrency_limit();
        let stage_key = key.clone();

        let runner: ErasedRunner = Arc::new(move |input, state, run, progress| {
            let stage = Arc::clone(&stage);
            let stage_key = stage_key.clone();
            Box::pin(async move {
                let typed: S::Input = match input.downcast_ref::<S::Input>() {
                    Some(value) => value.clone(),
                    None => {
                        return StageReport::err(StageError::unhandled(format!(
                            "input type mismatch entering stage key: {}",
                            stage_key
                        )))
                    }
                };
                let mut ctx = StageContext::new(typed, state, run);
                if let Some(progress) = progress {
                    ctx = ctx.with_progress(progress);
                }
                let guarded = std::panic::AssertUnwindSafe(stage.execute(ctx)).catch_unwind().await;
                match guarded {
                    Ok(report) => report.map(|value| Arc::new(value) as StateValue),
                    Err(panic) => StageReport::err(StageError::unhandled(panic_message(panic.as_ref()))),
                }
            })
        });

        let mut stages = self.stages;
        stages.push(ErasedStage {
            key,
            name,
            input_type: std::any::type_name::<S::Input>(),
            retry,
            is_list,
            concurrency,
            runner,
        });
        Ok(Pipeline {
            name: self.name,
            stages,
            context_builder: self.context_builder,
            tracker: self.tracker,
            _types: PhantomData,
        })
    }

    /// Evaluates a condition over the stage context and delegates to one
    /// of two stages sharing an output type. The branch stage's name is
    /// `branch(<true>|<false>)`.
    pub fn branch<ST, SF, C>(
        self,
        key: impl Into<String>,
        condition: C,
        true_stage: ST,
        false_stage: SF,
    ) -> StageResult<Pipeline<I, ST::Output>>
    where
        ST: Stage<Input = O> + 'static,
        SF: Stage<Input = O, Output = ST::Output> + 'static,
        C: Fn(&O, &AccumulatedState, &RunContext) -> bool + Send + Sync + 'static,
    {
        let stage = BranchStage::new(condition, true_stage, false_stage);
        self.add(key, stage)
    }

    /// Attaches a progress tracker; the engine publishes pipeline, step,
    /// and item lifecycle events into it.
    pub fn with_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// The pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stages in the chain.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Stage keys in chain order.
    pub fn keys(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.key.as_str()).collect()
    }

    /// Runs the chain. Never raises: failures come back as the outcome's
    /// error side with the failing stage's aggregate metadata.
    pub async fn execute(&self, input: I) -> StageOutcome<O> {
        let trace_id = Uuid::new_v4().to_string();
        let run_started_at = Utc::now();
        let run_started = Instant::now();

        if let Some(tracker) = &self.tracker {
            tracker.begin_run(self.stages.len());
            tracker.publish(&ProgressEvent::pipeline_start());
            for stage in &self.stages {
                tracker.note_step_concurrency(&stage.name, stage.concurrency);
            }
        }

        let run = match &self.context_builder {
            Some(builder) => match builder().await {
                Ok(run) => run,
                Err(error) => {
                    let meta = StageMetadata::record(self.name.clone(), run_started_at, Utc::now())
                        .with_trace_id(trace_id.clone());
                    if let Some(tracker) = &self.tracker {
                        tracker.publish(&ProgressEvent::pipeline_error(&error));
                    }
                    tracing::error!(
                        component = "pipeline",
                        event = "pipeline_failed",
                        trace_id = %trace_id,
                        pipeline = %self.name,
                        code = %error.code(),
                        error = %error.message(),
                        "context builder failed"
                    );
                    return StageOutcome::failure(error, meta);
                }
            },
            None => RunContext::empty(),
        };

        let progress: Option<Arc<dyn ProgressSink>> = self
            .tracker
            .as_ref()
            .map(|tracker| Arc::new(tracker.clone()) as Arc<dyn ProgressSink>);

        let mut state = AccumulatedState::new();
        let mut current: StateValue = Arc::new(input);

        for stage in &self.stages {
            let span_id = Uuid::new_v4().to_string();
            tracing::info!(
                component = "pipeline",
                event = "stage_start",
                trace_id = %trace_id,
                span_id = %span_id,
                stage_name = %stage.name,
                stage_key = %stage.key,
                input_type = stage.input_type,
                list_operation = stage.is_list,
                "stage started"
            );
            if let Some(tracker) = &self.tracker {
                tracker.publish(&ProgressEvent::step_start(&stage.name));
            }

            let stage_started_at = Utc::now();
            let report = self
                .execute_with_retry(stage, Arc::clone(&current), state.clone(), run.clone(), progress.clone(), &trace_id, &span_id)
                .await;
            let stage_ended_at = Utc::now();

            let (result, list_metadata) = report.into_parts();
            let meta = StageMetadata::record(stage.name.clone(), stage_started_at, stage_ended_at)
                .with_trace_id(trace_id.clone())
                .with_span_id(span_id.clone())
                .with_list_metadata(list_metadata.clone());

            match result {
                Err(error) => {
                    tracing::error!(
                        component = "pipeline",
                        event = "stage_failed",
                        trace_id = %trace_id,
                        span_id = %span_id,
                        stage_name = %stage.name,
                        stage_key = %stage.key,
                        duration_ms = meta.duration_ms(),
                        code = %error.code(),
                        error = %error.message(),
                        retryable = error.retryable(),
                        "stage failed"
                    );
                    if let Some(tracker) = &self.tracker {
                        tracker.publish(&ProgressEvent::step_error(&stage.name, &error));
                        tracker.publish(&ProgressEvent::pipeline_error(&error));
                    }
                    return StageOutcome::failure(error, meta);
                }
                Ok(value) => {
                    if let Some(list) = &list_metadata {
                        if let Ok(rendered) = serde_json::to_value(list) {
                            tracing::debug!(
                                component = "pipeline",
                                event = "stage_telemetry",
                                trace_id = %trace_id,
                                span_id = %span_id,
                                stage_key = %stage.key,
                                list_metadata = %crate::infrastructure::logging::debug_payload(&rendered),
                                "list telemetry"
                            );
                        }
                    }
                    match &list_metadata {
                        Some(list) => tracing::info!(
                            component = "pipeline",
                            event = "stage_complete",
                            trace_id = %trace_id,
                            span_id = %span_id,
                            stage_name = %stage.name,
                            stage_key = %stage.key,
                            duration_ms = meta.duration_ms(),
                            total_items = list.total_items(),
                            success_count = list.success_count(),
                            failure_count = list.failure_count(),
                            skipped_count = list.skipped_count(),
                            execution_strategy = %list.execution_strategy(),
                            "stage completed"
                        ),
                        None => tracing::info!(
                            component = "pipeline",
                            event = "stage_complete",
                            trace_id = %trace_id,
                            span_id = %span_id,
                            stage_name = %stage.name,
                            stage_key = %stage.key,
                            duration_ms = meta.duration_ms(),
                            "stage completed"
                        ),
                    }
                    if let Some(tracker) = &self.tracker {
                        tracker.publish(&ProgressEvent::step_complete(&stage.name));
                    }
                    // Guarded against at construction; duplicate keys cannot
                    // reach execution.
                    let _ = state.insert(stage.key.clone(), Arc::clone(&value));
                    current = value;
                }
            }
        }

        let data: O = match current.downcast_ref::<O>() {
            Some(value) => value.clone(),
            None => {
                let error = StageError::unhandled("pipeline output type mismatch");
                let meta = StageMetadata::record(self.name.clone(), run_started_at, Utc::now())
                    .with_trace_id(trace_id.clone());
                return StageOutcome::failure(error, meta);
            }
        };

        if let Some(tracker) = &self.tracker {
            tracker.publish(&ProgressEvent::pipeline_complete());
        }
        tracing::info!(
            component = "pipeline",
            event = "pipeline_complete",
            trace_id = %trace_id,
            pipeline = %self.name,
            duration_ms = run_started.elapsed().as_millis() as u64,
            stages = self.stages.len(),
            "pipeline completed"
        );

        let meta = StageMetadata::record(self.name.clone(), run_started_at, Utc::now()).with_trace_id(trace_id);
        StageOutcome::success(data, meta)
    }

    /// Invokes one stage through its retry policy.
    #[allow(clippy::too_many_arguments)]
    async fn execute_with_retry(
        &self,
        stage: &ErasedStage,
        input: StateValue,
        state: AccumulatedState,
        run: RunContext,
        progress: Option<Arc<dyn ProgressSink>>,
        trace_id: &str,
        span_id: &str,
    ) -> StageReport<StateValue> {
        let policy = stage.retry.clone().unwrap_or_default();
        let mut attempt = 1u32;
        loop {
            let report = (stage.runner)(Arc::clone(&input), state.clone(), run.clone(), progress.clone()).await;
            let error_code = match report.result() {
                Ok(_) => return report,
                Err(error) => {
                    let can_retry =
                        error.retryable() && attempt < policy.max_attempts() && policy.allows_code(error.code());
                    if !can_retry {
                        None
                    } else {
                        Some(error.code().to_string())
                    }
                }
            };
            let Some(code) = error_code else {
                return report;
            };
            let backoff = policy.backoff_for(attempt);
            tracing::warn!(
                component = "pipeline",
                event = "stage_retry",
                trace_id = %trace_id,
                span_id = %span_id,
                stage_name = %stage.name,
                stage_key = %stage.key,
                attempt = attempt,
                backoff_ms = backoff.as_millis() as u64,
                code = %code,
                "stage retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

/// List-stage shortcuts, available whenever the chain currently produces a
/// collection.
impl<I, T> Pipeline<I, Vec<T>>
where
    I: Send + Sync + Clone + 'static,
    T: Send + Sync + Clone + 'static,
{
    /// Appends a per-item map stage with default list options.
    pub fn map<U, F, Fut>(self, key: impl Into<String>, f: F) -> StageResult<Pipeline<I, Vec<U>>>
    where
        U: Send + Sync + Clone + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StageResult<U>> + Send + 'static,
    {
        self.map_with(key, f, ListOptions::default())
    }

    /// Appends a per-item map stage with explicit list options.
    pub fn map_with<U, F, Fut>(self, key: impl Into<String>, f: F, options: ListOptions) -> StageResult<Pipeline<I, Vec<U>>>
    where
        U: Send + Sync + Clone + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StageResult<U>> + Send + 'static,
    {
        let key = key.into();
        let stage = ListStage::new(format!("map({})", key), move |item, _ctx| f(item)).with_options(options);
        self.add(key, stage)
    }

    /// Appends a one-to-many stage; outputs are concatenated in input
    /// order.
    pub fn flat_map<U, F, Fut>(self, key: impl Into<String>, f: F) -> StageResult<Pipeline<I, Vec<U>>>
    where
        U: Send + Sync + Clone + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StageResult<Vec<U>>> + Send + 'static,
    {
        self.flat_map_with(key, f, ListOptions::default())
    }

    /// Appends a one-to-many stage with explicit list options.
    pub fn flat_map_with<U, F, Fut>(
        self,
        key: impl Into<String>,
        f: F,
        options: ListOptions,
    ) -> StageResult<Pipeline<I, Vec<U>>>
    where
        U: Send + Sync + Clone + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StageResult<Vec<U>>> + Send + 'static,
    {
        let key = key.into();
        let stage = FlatMapStage::new(format!("flat_map({})", key), move |item, _ctx| f(item)).with_options(options);
        self.add(key, stage)
    }

    /// Appends an order-preserving filter stage.
    pub fn filter<F, Fut>(self, key: impl Into<String>, predicate: F) -> StageResult<Pipeline<I, Vec<T>>>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StageResult<bool>> + Send + 'static,
    {
        let key = key.into();
        let stage = FilterStage::new(format!("filter({})", key), predicate);
        self.add(key, stage)
    }

    /// Appends a fixed-size grouping stage; the size is validated here.
    pub fn batch(self, key: impl Into<String>, size: usize) -> StageResult<Pipeline<I, Vec<Vec<T>>>> {
        let stage = BatchStage::new(size)?;
        self.add(key, stage)
    }
}

impl<I, T> Pipeline<I, Vec<Vec<T>>>
where
    I: Send + Sync + Clone + 'static,
    T: Send + Sync + Clone + 'static,
{
    /// Appends a shallow flattening stage.
    pub fn flatten(self, key: impl Into<String>) -> StageResult<Pipeline<I, Vec<T>>> {
        self.add(key, FlattenStage::new())
    }
}

/// Conditional delegation between two stages sharing an output type.
pub struct BranchStage<ST, SF, C> {
    name: String,
    condition: C,
    true_stage: ST,
    false_stage: SF,
}

impl<ST, SF, C> BranchStage<ST, SF, C>
where
    ST: Stage,
    SF: Stage<Input = ST::Input, Output = ST::Output>,
    C: Fn(&ST::Input, &AccumulatedState, &RunContext) -> bool + Send + Sync,
{
    /// Builds a branch stage named `branch(<true>|<false>)`.
    pub fn new(condition: C, true_stage: ST, false_stage: SF) -> Self {
        Self {
            name: format!("branch({}|{})", true_stage.name(), false_stage.name()),
            condition,
            true_stage,
            false_stage,
        }
    }
}

#[async_trait::async_trait]
impl<ST, SF, C> Stage for BranchStage<ST, SF, C>
where
    ST: Stage,
    SF: Stage<Input = ST::Input, Output = ST::Output>,
    C: Fn(&ST::Input, &AccumulatedState, &RunContext) -> bool + Send + Sync,
{
    type Input = ST::Input;
    type Output = ST::Output;

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: StageContext<Self::Input>) -> StageReport<Self::Output> {
        if (self.condition)(ctx.input(), ctx.state(), ctx.run()) {
            self.true_stage.execute(ctx).await
        } else {
            self.false_stage.execute(ctx).await
        }
    }
}

/// Renders a panic payload for the contained `UNHANDLED_ERROR`.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "stage panicked".to_string()
    }
}
