// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Batch/Stream Adapters
//!
//! Projections between the two pipeline kinds:
//!
//! - [`to_streaming`] lifts a batch stage into a streaming stage that
//!   invokes it once per item with a per-item snapshot of accumulated
//!   state; a failure surfaces as `<stage> failed: <message>` with the
//!   original code preserved.
//! - [`to_batch`] wraps a streaming stage into a batch stage: the input
//!   collection is fed through as a sequence and the output materialized.
//!   The projected state is snapshot-only; stream accessors report
//!   `Stream access not supported in batch mode`, and conversion failures
//!   carry `BATCH_CONVERSION_ERROR`.
//! - [`HybridStage`] carries both execution modes in one value and
//!   implements both stage traits, so either pipeline kind accepts it
//!   directly; its batch path wraps failures as `HYBRID_STEP_ERROR`.
//!
//! ## Categorization
//!
//! [`categorize`] classifies a stage by substring-matching its human
//! name; an explicit category declared on the stage always wins, the
//! heuristic is the fallback. [`recommend`] maps a category onto an
//! execution-mode recommendation with a strength and a human reason.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::TryStreamExt;
use uuid::Uuid;

use flowline_domain::{
    ItemStream, RetryPolicy, Stage, StageCategory, StageContext, StageError, StageReport, StageResult, StreamContext,
    StreamingStage, StreamingState,
};

use crate::infrastructure::stream::from_vec;

/// Lifts a batch stage into a streaming stage.
pub fn to_streaming<S>(stage: S) -> StreamedStage<S>
where
    S: Stage + 'static,
{
    StreamedStage {
        inner: Arc::new(stage),
    }
}

/// A batch stage projected onto the streaming surface.
pub struct StreamedStage<S> {
    inner: Arc<S>,
}

impl<S> StreamingStage<S::Input, S::Output> for StreamedStage<S>
where
    S: Stage + 'static,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn category(&self) -> Option<StageCategory> {
        self.inner.category()
    }

    fn apply(&self, input: ItemStream<S::Input>, ctx: StreamContext) -> ItemStream<S::Output> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async_stream::try_stream! {
            let mut input = input;
            while let Some(item) = input.try_next().await? {
                // Each invocation sees the snapshots accumulated so far
                let state = ctx.state().accumulated_view();
                let stage_ctx = StageContext::new(item, state, ctx.run().clone());
                let report = inner.execute(stage_ctx).await;
                match report.into_result() {
                    Ok(output) => yield output,
                    Err(error) => {
                        let named = StageError::new(
                            error.code().to_string(),
                            format!("{} failed: {}", inner.name(), error.message()),
                        )
                        .with_retryable(error.retryable())
                        .with_cause(error);
                        Err::<S::Output, StageError>(named)?;
                    }
                }
            }
        })
    }
}

/// Wraps a streaming stage into a batch stage over collections.
pub fn to_batch<In, Out, S>(stage: S) -> BatchedStage<In, Out, S>
where
    In: Send + Sync + Clone + 'static,
    Out: Send + Sync + Clone + 'static,
    S: StreamingStage<In, Out> + 'static,
{
    BatchedStage {
        inner: Arc::new(stage),
        _types: PhantomData,
    }
}

/// A streaming stage projected onto the batch surface.
pub struct BatchedStage<In, Out, S> {
    inner: Arc<S>,
    _types: PhantomData<fn(In) -> Out>,
}

#[async_trait]
impl<In, Out, S> Stage for BatchedStage<In, Out, S>
where
    In: Send + Sync + Clone + 'static,
    Out: Send + Sync + Clone + 'static,
    S: StreamingStage<In, Out> + 'static,
{
    type Input = Vec<In>;
    type Output = Vec<Out>;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn category(&self) -> Option<StageCategory> {
        self.inner.category()
    }

    fn is_list_operation(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: StageContext<Self::Input>) -> StageReport<Self::Output> {
        let (items, state, run, _progress) = ctx.into_parts();
        let streaming_state = Arc::new(StreamingState::batch_mode(&state));
        let stream_ctx = StreamContext::new(streaming_state, run, Uuid::new_v4().to_string());
        let output = self.inner.apply(from_vec(items), stream_ctx);
        match output.try_collect::<Vec<Out>>().await {
            Ok(outputs) => StageReport::ok(outputs),
            Err(error) => {
                let wrapped = StageError::batch_conversion(format!(
                    "{} failed during stream-to-batch conversion: {}",
                    self.inner.name(),
                    error.message()
                ))
                .with_retryable(error.retryable())
                .with_cause(error);
                StageReport::err(wrapped)
            }
        }
    }
}

type BatchFn<T, U> = Arc<dyn Fn(StageContext<Vec<T>>) -> BoxFuture<'static, StageResult<Vec<U>>> + Send + Sync>;
type StreamFn<T, U> = Arc<dyn Fn(ItemStream<T>, StreamContext) -> ItemStream<U> + Send + Sync>;

/// A stage carrying both execution modes. Implements [`Stage`] through
/// its batch path and [`StreamingStage`] through its stream path, so a
/// hybrid value drops into either pipeline kind unchanged.
pub struct HybridStage<T, U> {
    name: String,
    retry: Option<RetryPolicy>,
    category: Option<StageCategory>,
    batch_fn: BatchFn<T, U>,
    stream_fn: StreamFn<T, U>,
}

/// Builds a hybrid stage from its two execution paths.
pub fn hybrid<T, U, BF, BFut, SF>(name: impl Into<String>, batch_fn: BF, stream_fn: SF) -> HybridStage<T, U>
where
    T: Send + Sync + Clone + 'static,
    U: Send + Sync + Clone + 'static,
    BF: Fn(StageContext<Vec<T>>) -> BFut + Send + Sync + 'static,
    BFut: Future<Output = StageResult<Vec<U>>> + Send + 'static,
    SF: Fn(ItemStream<T>, StreamContext) -> ItemStream<U> + Send + Sync + 'static,
{
    HybridStage {
        name: name.into(),
        retry: None,
        category: None,
        batch_fn: Arc::new(move |ctx| Box::pin(batch_fn(ctx))),
        stream_fn: Arc::new(stream_fn),
    }
}

impl<T, U> HybridStage<T, U> {
    /// Attaches a retry policy, honored on the batch path.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Declares an explicit category; the name heuristic is bypassed.
    pub fn with_category(mut self, category: StageCategory) -> Self {
        self.category = Some(category);
        self
    }
}

#[async_trait]
impl<T, U> Stage for HybridStage<T, U>
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

    fn category(&self) -> Option<StageCategory> {
        self.category
    }

    fn is_list_operation(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: StageContext<Self::Input>) -> StageReport<Self::Output> {
        match (self.batch_fn)(ctx).await {
            Ok(outputs) => StageReport::ok(outputs),
            Err(error) => {
                let wrapped = StageError::hybrid_step(format!("{}: {}", self.name, error.message()))
                    .with_retryable(error.retryable())
                    .with_cause(error);
                StageReport::err(wrapped)
            }
        }
    }
}

impl<T, U> StreamingStage<T, U> for HybridStage<T, U>
where
    T: Send + Sync + Clone + 'static,
    U: Send + Sync + Clone + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Option<StageCategory> {
        self.category
    }

    fn apply(&self, input: ItemStream<T>, ctx: StreamContext) -> ItemStream<U> {
        (self.stream_fn)(input, ctx)
    }
}

const IO_BOUND_TOKENS: &[&str] = &["read", "write", "fetch", "api", "db", "database"];
const AGGREGATION_TOKENS: &[&str] = &["sort", "group", "aggregate", "sum", "count", "statistics"];
const EXPANSION_TOKENS: &[&str] = &["split", "expand", "explode", "unnest"];
const REDUCTION_TOKENS: &[&str] = &["filter", "distinct", "dedup", "sample"];
const STATEFUL_TOKENS: &[&str] = &["cache", "session", "accumulate", "state"];

/// Classifies a stage by substring-matching its human name; the fallback
/// when a stage declares no explicit category.
pub fn categorize(name: &str) -> StageCategory {
    let lower = name.to_lowercase();
    let matches = |tokens: &[&str]| tokens.iter().any(|token| lower.contains(token));
    if matches(IO_BOUND_TOKENS) {
        StageCategory::IoBound
    } else if matches(AGGREGATION_TOKENS) {
        StageCategory::Aggregation
    } else if matches(EXPANSION_TOKENS) {
        StageCategory::Expansion
    } else if matches(REDUCTION_TOKENS) {
        StageCategory::Reduction
    } else if matches(STATEFUL_TOKENS) {
        StageCategory::Stateful
    } else {
        StageCategory::PureTransform
    }
}

/// Resolves a batch stage's category: explicit declaration first, name
/// heuristic as fallback.
pub fn categorize_stage<S: Stage>(stage: &S) -> StageCategory {
    stage.category().unwrap_or_else(|| categorize(stage.name()))
}

/// Resolves a streaming stage's category the same way.
pub fn categorize_streaming_stage<In, Out, S>(stage: &S) -> StageCategory
where
    In: Send + 'static,
    Out: Send + 'static,
    S: StreamingStage<In, Out>,
{
    stage.category().unwrap_or_else(|| categorize(stage.name()))
}

/// An execution-mode recommendation for one stage category.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamingRecommendation {
    /// Whether streaming execution is recommended at all.
    pub recommended: bool,
    /// Confidence in the recommendation, 0–1.
    pub strength: f64,
    /// Human-readable rationale.
    pub reason: String,
    /// Suggested execution approach.
    pub approach: String,
}

/// Maps a stage category onto an execution-mode recommendation.
pub fn recommend(category: StageCategory) -> StreamingRecommendation {
    match category {
        StageCategory::IoBound => StreamingRecommendation {
            recommended: true,
            strength: 0.9,
            reason: "I/O waits overlap across in-flight items".to_string(),
            approach: "streaming with bounded-concurrency parallel map".to_string(),
        },
        StageCategory::Expansion => StreamingRecommendation {
            recommended: true,
            strength: 0.7,
            reason: "expanding stages avoid holding the full expansion in memory".to_string(),
            approach: "streaming flat_map".to_string(),
        },
        StageCategory::Reduction => StreamingRecommendation {
            recommended: true,
            strength: 0.6,
            reason: "reducing stages shrink the flow before downstream work".to_string(),
            approach: "streaming filter".to_string(),
        },
        StageCategory::PureTransform => StreamingRecommendation {
            recommended: true,
            strength: 0.5,
            reason: "one-to-one transforms run identically in either mode".to_string(),
            approach: "streaming map, or batch when the collection is small".to_string(),
        },
        StageCategory::Aggregation => StreamingRecommendation {
            recommended: false,
            strength: 0.8,
            reason: "aggregation needs the whole collection at once".to_string(),
            approach: "batch stage, or a window stage for partial aggregates".to_string(),
        },
        StageCategory::Stateful => StreamingRecommendation {
            recommended: false,
            strength: 0.7,
            reason: "cross-item state is simpler to audit in batch mode".to_string(),
            approach: "batch stage with accumulated state".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristics_match_known_tokens() {
        assert_eq!(categorize("fetch_embeddings"), StageCategory::IoBound);
        assert_eq!(categorize("WriteToDb"), StageCategory::IoBound);
        assert_eq!(categorize("sort_by_score"), StageCategory::Aggregation);
        assert_eq!(categorize("count_rows"), StageCategory::Aggregation);
        assert_eq!(categorize("split_sentences"), StageCategory::Expansion);
        assert_eq!(categorize("filter_empty"), StageCategory::Reduction);
        assert_eq!(categorize("session_cache"), StageCategory::Stateful);
        assert_eq!(categorize("normalize"), StageCategory::PureTransform);
    }

    #[test]
    fn explicit_category_wins_over_the_heuristic() {
        use flowline_domain::{FnStage, StageContext};

        let stage = FnStage::new("fetch_rows", |ctx: StageContext<Vec<i64>>| async move {
            Ok(ctx.input().clone())
        })
        .with_category(StageCategory::Aggregation);
        assert_eq!(categorize_stage(&stage), StageCategory::Aggregation);

        let bare = FnStage::new("fetch_rows", |ctx: StageContext<Vec<i64>>| async move {
            Ok(ctx.input().clone())
        });
        assert_eq!(categorize_stage(&bare), StageCategory::IoBound);
    }

    #[test]
    fn recommendations_cover_every_category() {
        for category in [
            StageCategory::PureTransform,
            StageCategory::IoBound,
            StageCategory::Aggregation,
            StageCategory::Expansion,
            StageCategory::Reduction,
            StageCategory::Stateful,
        ] {
            let recommendation = recommend(category);
            assert!((0.0..=1.0).contains(&recommendation.strength));
            assert!(!recommendation.reason.is_empty());
            assert!(!recommendation.approach.is_empty());
        }
        assert!(recommend(StageCategory::IoBound).recommended);
        assert!(!recommend(StageCategory::Aggregation).recommended);
    }
}
