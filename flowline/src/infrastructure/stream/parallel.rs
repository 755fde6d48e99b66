// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Parallel Executor
//!
//! Bounded-concurrency transformation over lazy sequences.
//!
//! ## Contract
//!
//! - At no time are more than `concurrency` transforms in flight.
//! - The source is pulled only when an in-flight slot frees: strict
//!   backpressure, never pre-reading beyond one item per free slot.
//! - **Ordered mode** emits in source index order, buffering
//!   completed-out-of-order results; **unordered mode** emits each result
//!   as it completes.
//! - **Fail-fast**: the first failing transform terminates the sequence
//!   with that error; dropping the terminated sequence abandons remaining
//!   in-flight work and runs source cleanup.
//!
//! The implementation rides the `futures` bounded-concurrency adapters
//! (`try_buffered` / `try_buffer_unordered`), which poll the source and
//! the in-flight set through a single task; no work leaks past an abort
//! because dropping the adapter drops both.

use std::future::Future;
use std::sync::Arc;

use futures::TryStreamExt;

use flowline_domain::{ItemStream, StageError, StageResult};

use super::operators::fail;

/// Options for [`parallel_map`].
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ParallelOptions {
    /// Maximum in-flight transforms; must be at least 1.
    pub concurrency: usize,
    /// Emit in source index order (true) or completion order (false).
    pub ordered: bool,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            ordered: true,
        }
    }
}

impl ParallelOptions {
    /// Ordered options with the given concurrency.
    pub fn ordered(concurrency: usize) -> Self {
        Self {
            concurrency,
            ordered: true,
        }
    }

    /// Unordered options with the given concurrency.
    pub fn unordered(concurrency: usize) -> Self {
        Self {
            concurrency,
            ordered: false,
        }
    }
}

/// Runs up to `concurrency` concurrent invocations of `f(item, index)`
/// over the source.
pub fn parallel_map<T, U, F, Fut>(source: ItemStream<T>, f: F, options: ParallelOptions) -> ItemStream<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StageResult<U>> + Send + 'static,
{
    if options.concurrency == 0 {
        return fail(StageError::invalid_config("parallel concurrency must be at least 1"));
    }
    let mut index = 0usize;
    let in_flight = source.map_ok(move |item| {
        let item_index = index;
        index += 1;
        f(item, item_index)
    });
    if options.ordered {
        Box::pin(in_flight.try_buffered(options.concurrency))
    } else {
        Box::pin(in_flight.try_buffer_unordered(options.concurrency))
    }
}

/// Keeps items the async predicate accepts, evaluating up to
/// `concurrency` predicates concurrently while preserving input order.
pub fn parallel_filter<T, F, Fut>(source: ItemStream<T>, predicate: F, concurrency: usize) -> ItemStream<T>
where
    T: Clone + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StageResult<bool>> + Send + 'static,
{
    let predicate = Arc::new(predicate);
    let paired = parallel_map(
        source,
        move |item: T, _index| {
            let predicate = Arc::clone(&predicate);
            async move {
                let keep = predicate(item.clone()).await?;
                Ok((item, keep))
            }
        },
        ParallelOptions::ordered(concurrency),
    );
    Box::pin(paired.try_filter_map(|(item, keep)| async move { Ok(keep.then_some(item)) }))
}
