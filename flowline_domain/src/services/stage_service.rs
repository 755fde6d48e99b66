// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Service
//!
//! The core execution seam of the batch pipeline: a [`Stage`] is an atomic,
//! immutable transformation with a name, an optional retry policy, and an
//! async execute operation over a [`StageContext`].
//!
//! ## Design
//!
//! - **Immutable**: a stage never mutates after construction; the same
//!   stage value may be executed any number of times.
//! - **Typed at the seam**: input and output are associated types, so a
//!   pipeline's chain is checked at compile time while the runtime state
//!   map stays opaque.
//! - **Failure as data**: execute returns a [`StageReport`], never panics
//!   by contract; panics that do escape are contained by the engine and
//!   surfaced as `UNHANDLED_ERROR`.
//!
//! ## Usage Examples
//!
//! ```
//! use flowline_domain::services::stage_service::FnStage;
//! use flowline_domain::StageContext;
//!
//! let double = FnStage::new("double", |ctx: StageContext<u32>| async move { Ok(ctx.input() * 2) });
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::entities::processing_context::StageContext;
use crate::entities::stage_outcome::StageReport;
use crate::error::StageResult;
use crate::value_objects::{RetryPolicy, StageCategory};

/// An atomic transformation in a batch pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// The declared input type; must match the previous stage's output.
    type Input: Send + Sync + Clone + 'static;
    /// The declared output type, stored in accumulated state under the
    /// stage's key.
    type Output: Send + Sync + Clone + 'static;

    /// Human-readable stage name, used in telemetry and categorization.
    fn name(&self) -> &str;

    /// The stage's retry policy; a stage without one runs exactly once.
    fn retry_policy(&self) -> Option<&RetryPolicy> {
        None
    }

    /// Explicit category, when the stage declares one; heuristics apply
    /// otherwise.
    fn category(&self) -> Option<StageCategory> {
        None
    }

    /// Whether the stage processes a collection item-by-item; list stages
    /// attach list-operation telemetry to their reports.
    fn is_list_operation(&self) -> bool {
        false
    }

    /// The stage's in-flight bound, when it executes items in parallel.
    fn concurrency_limit(&self) -> Option<usize> {
        None
    }

    /// Runs the stage against the execute-time environment.
    async fn execute(&self, ctx: StageContext<Self::Input>) -> StageReport<Self::Output>;
}

type StageFn<I, O> = dyn Fn(StageContext<I>) -> BoxFuture<'static, StageResult<O>> + Send + Sync;

/// A stage built from an async closure.
pub struct FnStage<I, O> {
    name: String,
    retry: Option<RetryPolicy>,
    category: Option<StageCategory>,
    func: Arc<StageFn<I, O>>,
}

impl<I, O> FnStage<I, O>
where
    I: Send + Sync + Clone + 'static,
    O: Send + Sync + Clone + 'static,
{
    /// Wraps an async closure under the given name.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(StageContext<I>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StageResult<O>> + Send + 'static,
    {
        Self {
            name: name.into(),
            retry: None,
            category: None,
            func: Arc::new(move |ctx| Box::pin(func(ctx))),
        }
    }

    /// Attaches a retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Declares an explicit category for this stage.
    pub fn with_category(mut self, category: StageCategory) -> Self {
        self.category = Some(category);
        self
    }
}

#[async_trait]
impl<I, O> Stage for FnStage<I, O>
where
    I: Send + Sync + Clone + 'static,
    O: Send + Sync + Clone + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    fn category(&self) -> Option<StageCategory> {
        self.category
    }

    async fn execute(&self, ctx: StageContext<Self::Input>) -> StageReport<Self::Output> {
        (self.func)(ctx).await.into()
    }
}
