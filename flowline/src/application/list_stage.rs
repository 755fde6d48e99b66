// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # List Adapter
//!
//! Lifts a single-item transform `T → U` into a collection stage
//! `Vec<T> → Vec<U>` with failure and concurrency policies.
//!
//! ## Failure Strategies
//!
//! - **FAIL_FAST** (default). Sequential: stop at the first failure and
//!   return it; items after the failure are skipped. Parallel: every item
//!   is attempted; after all in-flight work settles, the lowest-index
//!   failure is returned and nothing counts as skipped.
//! - **COLLECT_ERRORS**. Every item runs; any failure produces a
//!   `LIST_PROCESSING_ERRORS` aggregate whose message is
//!   `"N of M items failed"` and whose ordered item-failure list carries
//!   each `{index, error}`. The aggregate is retryable iff any
//!   constituent failure is.
//! - **SKIP_FAILED**. Every item runs; successes are returned in input
//!   order and failures count as skipped.
//!
//! ## Telemetry
//!
//! Per-item wall-clock timing is recorded for successes and failures
//! alike; the report's list metadata carries min/max/avg and the
//! 50/95/99th nearest-rank percentiles, the execution strategy, and (in
//! parallel mode only) the concurrency limit.
//!
//! ## Derived Stages
//!
//! [`BatchStage`] groups a collection into fixed-size batches,
//! [`FlattenStage`] undoes one level of grouping, and [`FilterStage`]
//! keeps items an async predicate accepts, preserving order.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::StreamExt;

use flowline_domain::{
    codes, AccumulatedState, BatchSize, ConcurrencyLimit, ErrorStrategy, ItemFailure, ItemTimings,
    ListOperationMetadata, ProgressEvent, ProgressSink, RetryPolicy, RunContext, Stage, StageContext, StageError,
    StageReport, StageResult,
};

/// Options of a list stage: failure strategy, execution mode, and
/// concurrency bound.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ListOptions {
    pub error_strategy: ErrorStrategy,
    pub parallel: bool,
    pub concurrency_limit: ConcurrencyLimit,
}

impl ListOptions {
    /// Sequential options under the given strategy.
    pub fn sequential(error_strategy: ErrorStrategy) -> Self {
        Self {
            error_strategy,
            ..Self::default()
        }
    }

    /// Parallel options under the given strategy and concurrency limit.
    pub fn parallel(error_strategy: ErrorStrategy, concurrency_limit: ConcurrencyLimit) -> Self {
        Self {
            error_strategy,
            parallel: true,
            concurrency_limit,
        }
    }
}

/// Per-item environment: the item index, prior stage outputs, and the
/// run-scoped record.
#[derive(Clone)]
pub struct ListItemContext {
    index: usize,
    state: AccumulatedState,
    run: RunContext,
}

impl ListItemContext {
    fn new(index: usize, state: AccumulatedState, run: RunContext) -> Self {
        Self { index, state, run }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> &AccumulatedState {
        &self.state
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }
}

type ItemTransform<T, U> = Arc<dyn Fn(T, ListItemContext) -> BoxFuture<'static, StageResult<U>> + Send + Sync>;

/// One settled item: its input index, result, and wall-clock duration.
struct SettledItem<U> {
    index: usize,
    result: StageResult<U>,
    elapsed: Duration,
}

/// A collection stage lifted from a single-item transform.
pub struct ListStage<T, U> {
    name: String,
    options: ListOptions,
    retry: Option<RetryPolicy>,
    transform: ItemTransform<T, U>,
}

impl<T, U> ListStage<T, U>
where
    T: Send + Sync + Clone + 'static,
    U: Send + Sync + Clone + 'static,
{
    /// Lifts a per-item transform under the given stage name.
    pub fn new<F, Fut>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(T, ListItemContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<U>> + Send + 'static,
    {
        Self {
            name: name.into(),
            options: ListOptions::default(),
            retry: None,
            transform: Arc::new(move |item, ctx| Box::pin(transform(item, ctx))),
        }
    }

    /// Replaces the stage options.
    pub fn with_options(mut self, options: ListOptions) -> Self {
        self.options = options;
        self
    }

    /// Attaches a retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Runs one item, timing it.
    async fn run_item(&self, index: usize, item: T, state: AccumulatedState, run: RunContext) -> SettledItem<U> {
        let started = Instant::now();
        let result = (self.transform)(item, ListItemContext::new(index, state, run)).await;
        SettledItem {
            index,
            result,
            elapsed: started.elapsed(),
        }
    }

    /// FAIL_FAST sequential: stop at the first failure, counting the rest
    /// as skipped.
    async fn execute_fail_fast_sequential(&self, ctx: StageContext<Vec<T>>) -> StageReport<Vec<U>> {
        let (items, state, run, progress) = ctx.into_parts();
        let total = items.len();
        let mut outputs: Vec<U> = Vec::with_capacity(total);
        let mut timings: Vec<Duration> = Vec::with_capacity(total);
        for (index, item) in items.into_iter().enumerate() {
            let settled = self.run_item(index, item, state.clone(), run.clone()).await;
            timings.push(settled.elapsed);
            match settled.result {
                Ok(output) => {
                    if let Some(sink) = &progress {
                        sink.publish(&ProgressEvent::item_processed(&self.name, index));
                    }
                    outputs.push(output);
                }
                Err(error) => {
                    if let Some(sink) = &progress {
                        sink.publish(&ProgressEvent::item_error(&self.name, index, &error));
                    }
                    let meta = ListOperationMetadata::sequential(total, outputs.len(), 1, total - index - 1)
                        .with_item_timings(ItemTimings::from_durations(&timings));
                    return StageReport::err(error).with_list_metadata(meta);
                }
            }
        }
        let meta = ListOperationMetadata::sequential(total, total, 0, 0)
            .with_item_timings(ItemTimings::from_durations(&timings));
        StageReport::ok(outputs).with_list_metadata(meta)
    }

    /// Runs every item to completion, sequentially or with bounded
    /// concurrency, settling in input-index order.
    async fn settle_all(&self, ctx: StageContext<Vec<T>>) -> (Vec<SettledItem<U>>, Option<Arc<dyn ProgressSink>>) {
        let (items, state, run, progress) = ctx.into_parts();
        let settled: Vec<SettledItem<U>> = if self.options.parallel {
            let limit = self.options.concurrency_limit.get();
            futures::stream::iter(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| self.run_item(index, item, state.clone(), run.clone())),
            )
            .buffered(limit)
            .collect()
            .await
        } else {
            let mut settled = Vec::new();
            for (index, item) in items.into_iter().enumerate() {
                settled.push(self.run_item(index, item, state.clone(), run.clone()).await);
            }
            settled
        };
        if let Some(sink) = &progress {
            for item in &settled {
                match &item.result {
                    Ok(_) => sink.publish(&ProgressEvent::item_processed(&self.name, item.index)),
                    Err(error) => sink.publish(&ProgressEvent::item_error(&self.name, item.index, error)),
                }
            }
        }
        (settled, progress)
    }

    /// Builds list metadata for a fully-settled run.
    fn settled_metadata(&self, settled: &[SettledItem<U>], success: usize, failure: usize, skipped: usize) -> ListOperationMetadata {
        let timings: Vec<Duration> = settled.iter().map(|item| item.elapsed).collect();
        let meta = if self.options.parallel {
            ListOperationMetadata::parallel(
                settled.len(),
                success,
                failure,
                skipped,
                self.options.concurrency_limit.get(),
            )
        } else {
            ListOperationMetadata::sequential(settled.len(), success, failure, skipped)
        };
        meta.with_item_timings(ItemTimings::from_durations(&timings))
    }
}

#[async_trait]
impl<T, U> Stage for ListStage<T, U>
where
    T: Send + Sync + Clone + 'static,
    U: Send + Sync + Clone + 'static,
{
    type Input = Vec<T>;
    type Output = Vec<U>;

    fn name(&self) -> &str {
        &self.name
    }

    fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    fn is_list_operation(&self) -> bool {
        true
    }

    fn concurrency_limit(&self) -> Option<usize> {
        self.options.parallel.then(|| self.options.concurrency_limit.get())
    }

    async fn execute(&self, ctx: StageContext<Self::Input>) -> StageReport<Self::Output> {
        if self.options.error_strategy == ErrorStrategy::FailFast && !self.options.parallel {
            return self.execute_fail_fast_sequential(ctx).await;
        }

        let (settled, _progress) = self.settle_all(ctx).await;
        let success = settled.iter().filter(|item| item.result.is_ok()).count();
        let failure = settled.len() - success;

        match self.options.error_strategy {
            ErrorStrategy::FailFast => {
                // Parallel FAIL_FAST: every item was attempted; return the
                // lowest-index failure for determinism. Settled items arrive
                // in input-index order, so the first error is the lowest.
                let meta = self.settled_metadata(&settled, success, failure, 0);
                let mut outputs: Vec<U> = Vec::with_capacity(settled.len());
                let mut first_error: Option<StageError> = None;
                for item in settled {
                    match item.result {
                        Ok(output) => outputs.push(output),
                        Err(error) => {
                            if first_error.is_none() {
                                first_error = Some(error);
                            }
                        }
                    }
                }
                match first_error {
                    Some(error) => StageReport::err(error).with_list_metadata(meta),
                    None => StageReport::ok(outputs).with_list_metadata(meta),
                }
            }
            ErrorStrategy::CollectErrors => {
                if failure > 0 {
                    let total = settled.len();
                    let meta = self.settled_metadata(&settled, success, failure, 0);
                    let retryable = settled
                        .iter()
                        .any(|item| item.result.as_ref().err().is_some_and(StageError::retryable));
                    let failures: Vec<ItemFailure> = settled
                        .into_iter()
                        .filter_map(|item| item.result.err().map(|error| ItemFailure::new(item.index, error)))
                        .collect();
                    let error = StageError::new(
                        codes::LIST_PROCESSING_ERRORS,
                        format!("{} of {} items failed", failure, total),
                    )
                    .with_retryable(retryable)
                    .with_item_failures(failures);
                    StageReport::err(error).with_list_metadata(meta)
                } else {
                    let meta = self.settled_metadata(&settled, success, 0, 0);
                    let outputs: Vec<U> = settled.into_iter().filter_map(|item| item.result.ok()).collect();
                    StageReport::ok(outputs).with_list_metadata(meta)
                }
            }
            ErrorStrategy::SkipFailed => {
                let meta = self.settled_metadata(&settled, success, 0, failure);
                let outputs: Vec<U> = settled.into_iter().filter_map(|item| item.result.ok()).collect();
                StageReport::ok(outputs).with_list_metadata(meta)
            }
        }
    }
}

/// Expands each item into zero or more outputs, concatenated in input
/// order. Built on the list adapter, so the failure strategies and the
/// per-item telemetry apply unchanged.
pub struct FlatMapStage<T, U> {
    inner: ListStage<T, Vec<U>>,
}

impl<T, U> FlatMapStage<T, U>
where
    T: Send + Sync + Clone + 'static,
    U: Send + Sync + Clone + 'static,
{
    /// Lifts a one-to-many transform under the given stage name.
    pub fn new<F, Fut>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(T, ListItemContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<Vec<U>>> + Send + 'static,
    {
        Self {
            inner: ListStage::new(name, transform),
        }
    }

    /// Replaces the stage options.
    pub fn with_options(mut self, options: ListOptions) -> Self {
        self.inner = self.inner.with_options(options);
        self
    }

    /// Attaches a retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.inner = self.inner.with_retry_policy(retry);
        self
    }
}

#[async_trait]
impl<T, U> Stage for FlatMapStage<T, U>
where
    T: Send + Sync + Clone + 'static,
    U: Send + Sync + Clone + 'static,
{
    type Input = Vec<T>;
    type Output = Vec<U>;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.inner.retry_policy()
    }

    fn is_list_operation(&self) -> bool {
        true
    }

    fn concurrency_limit(&self) -> Option<usize> {
        self.inner.concurrency_limit()
    }

    async fn execute(&self, ctx: StageContext<Self::Input>) -> StageReport<Self::Output> {
        let report = self.inner.execute(ctx).await;
        report.map(|groups| groups.into_iter().flatten().collect())
    }
}

/// Groups a collection into fixed-size batches; the final batch may be
/// short.
pub struct BatchStage<T> {
    name: String,
    size: BatchSize,
    _marker: PhantomData<fn(T)>,
}

impl<T> BatchStage<T>
where
    T: Send + Sync + Clone + 'static,
{
    /// Creates a batch stage; the size is validated at construction.
    pub fn new(size: usize) -> StageResult<Self> {
        let size = BatchSize::new(size)?;
        Ok(Self {
            name: format!("batch({})", size),
            size,
            _marker: PhantomData,
        })
    }
}

#[async_trait]
impl<T> Stage for BatchStage<T>
where
    T: Send + Sync + Clone + 'static,
{
    type Input = Vec<T>;
    type Output = Vec<Vec<T>>;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_list_operation(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: StageContext<Self::Input>) -> StageReport<Self::Output> {
        let items = ctx.into_input();
        let total = items.len();
        let size = self.size.get();
        let mut groups: Vec<Vec<T>> = Vec::with_capacity(total.div_ceil(size));
        let mut group: Vec<T> = Vec::with_capacity(size);
        for item in items {
            group.push(item);
            if group.len() == size {
                groups.push(std::mem::replace(&mut group, Vec::with_capacity(size)));
            }
        }
        if !group.is_empty() {
            groups.push(group);
        }
        StageReport::ok(groups).with_list_metadata(ListOperationMetadata::sequential(total, total, 0, 0))
    }
}

/// Undoes one level of grouping: `Vec<Vec<T>> → Vec<T>`, shallow.
pub struct FlattenStage<T> {
    name: String,
    _marker: PhantomData<fn(T)>,
}

impl<T> FlattenStage<T>
where
    T: Send + Sync + Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            name: "flatten".to_string(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for FlattenStage<T>
where
    T: Send + Sync + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Stage for FlattenStage<T>
where
    T: Send + Sync + Clone + 'static,
{
    type Input = Vec<Vec<T>>;
    type Output = Vec<T>;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_list_operation(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: StageContext<Self::Input>) -> StageReport<Self::Output> {
        let groups = ctx.into_input();
        let total = groups.len();
        let flattened: Vec<T> = groups.into_iter().flatten().collect();
        StageReport::ok(flattened).with_list_metadata(ListOperationMetadata::sequential(total, total, 0, 0))
    }
}

type PredicateFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, StageResult<bool>> + Send + Sync>;

/// Keeps items an async predicate accepts, preserving input order.
pub struct FilterStage<T> {
    name: String,
    predicate: PredicateFn<T>,
}

impl<T> FilterStage<T>
where
    T: Send + Sync + Clone + 'static,
{
    pub fn new<F, Fut>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageResult<bool>> + Send + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(move |item| Box::pin(predicate(item))),
        }
    }
}

#[async_trait]
impl<T> Stage for FilterStage<T>
where
    T: Send + Sync + Clone + 'static,
{
    type Input = Vec<T>;
    type Output = Vec<T>;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_list_operation(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: StageContext<Self::Input>) -> StageReport<Self::Output> {
        let items = ctx.into_input();
        let total = items.len();
        let mut kept: Vec<T> = Vec::with_capacity(total);
        for item in items {
            match (self.predicate)(item.clone()).await {
                Ok(true) => kept.push(item),
                Ok(false) => {}
                Err(error) => return StageReport::err(error),
            }
        }
        StageReport::ok(kept).with_list_metadata(ListOperationMetadata::sequential(total, total, 0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_domain::ExecutionStrategy;

    fn ctx(items: Vec<i64>) -> StageContext<Vec<i64>> {
        StageContext::new(items, AccumulatedState::new(), RunContext::empty())
    }

    fn doubling_stage() -> ListStage<i64, i64> {
        ListStage::new("double", |n: i64, _ctx| async move {
            if n % 2 == 0 {
                Err(StageError::from_message(format!("even input rejected: {}", n)))
            } else {
                Ok(n * 2)
            }
        })
    }

    #[tokio::test]
    async fn fail_fast_sequential_stops_at_first_failure() {
        let stage = doubling_stage();
        let report = stage.execute(ctx(vec![1, 3, 4, 5, 7])).await;
        let (result, meta) = report.into_parts();
        assert!(result.is_err());

        let meta = meta.unwrap();
        assert_eq!(meta.total_items(), 5);
        assert_eq!(meta.success_count(), 2);
        assert_eq!(meta.failure_count(), 1);
        assert_eq!(meta.skipped_count(), 2);
        assert_eq!(meta.execution_strategy(), ExecutionStrategy::Sequential);
        assert!(meta.item_timings().is_some());
    }

    #[tokio::test]
    async fn fail_fast_parallel_attempts_everything_and_returns_lowest_index() {
        let stage = doubling_stage().with_options(ListOptions::parallel(
            ErrorStrategy::FailFast,
            ConcurrencyLimit::new(4).unwrap(),
        ));
        let report = stage.execute(ctx(vec![1, 2, 3, 4])).await;
        let (result, meta) = report.into_parts();
        let error = result.unwrap_err();
        assert!(error.message().contains("even input rejected: 2"));

        let meta = meta.unwrap();
        assert_eq!(meta.skipped_count(), 0);
        assert_eq!(meta.success_count(), 2);
        assert_eq!(meta.failure_count(), 2);
        assert_eq!(meta.concurrency_limit(), Some(4));
        assert_eq!(meta.execution_strategy(), ExecutionStrategy::Parallel);
    }

    #[tokio::test]
    async fn collect_errors_aggregates_per_item_failures() {
        let stage = doubling_stage().with_options(ListOptions::sequential(ErrorStrategy::CollectErrors));
        let report = stage.execute(ctx(vec![1, 2, 3, 4, 5])).await;
        let (result, meta) = report.into_parts();
        let error = result.unwrap_err();
        assert_eq!(error.code(), codes::LIST_PROCESSING_ERRORS);
        assert_eq!(error.message(), "2 of 5 items failed");
        let indices: Vec<usize> = error.item_failures().iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert!(!error.retryable());

        let meta = meta.unwrap();
        assert_eq!(meta.success_count(), 3);
        assert_eq!(meta.failure_count(), 2);
    }

    #[tokio::test]
    async fn collect_errors_is_retryable_when_any_constituent_is() {
        let stage = ListStage::new("flaky", |n: i64, _ctx| async move {
            if n == 2 {
                Err(StageError::from_message("connect ETIMEDOUT"))
            } else {
                Ok(n)
            }
        })
        .with_options(ListOptions::sequential(ErrorStrategy::CollectErrors));
        let report = stage.execute(ctx(vec![1, 2, 3])).await;
        assert!(report.into_result().unwrap_err().retryable());
    }

    #[tokio::test]
    async fn skip_failed_keeps_successes_in_input_order() {
        let stage = doubling_stage().with_options(ListOptions::sequential(ErrorStrategy::SkipFailed));
        let report = stage.execute(ctx(vec![1, 2, 3, 4, 5])).await;
        let (result, meta) = report.into_parts();
        assert_eq!(result.unwrap(), vec![2, 6, 10]);

        let meta = meta.unwrap();
        assert_eq!(meta.success_count(), 3);
        assert_eq!(meta.failure_count(), 0);
        assert_eq!(meta.skipped_count(), 2);
    }

    #[tokio::test]
    async fn batch_stage_validates_and_groups() {
        assert!(BatchStage::<i64>::new(0).is_err());

        let stage = BatchStage::<i64>::new(3).unwrap();
        assert_eq!(stage.name(), "batch(3)");
        let report = stage.execute(ctx((1..=10).collect())).await;
        let groups = report.into_result().unwrap();
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[3], vec![10]);
    }

    #[tokio::test]
    async fn flatten_undoes_batch() {
        let items: Vec<i64> = (1..=10).collect();
        let batch = BatchStage::<i64>::new(3).unwrap();
        let groups = batch.execute(ctx(items.clone())).await.into_result().unwrap();

        let flatten = FlattenStage::<i64>::new();
        let flat_ctx = StageContext::new(groups, AccumulatedState::new(), RunContext::empty());
        assert_eq!(flatten.execute(flat_ctx).await.into_result().unwrap(), items);
    }

    #[tokio::test]
    async fn filter_stage_preserves_order() {
        let stage = FilterStage::new("positive", |n: i64| async move { Ok(n > 0) });
        let report = stage.execute(ctx(vec![3, -1, 5, 0, 7])).await;
        assert_eq!(report.into_result().unwrap(), vec![3, 5, 7]);
    }
}
