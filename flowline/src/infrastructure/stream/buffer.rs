// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Buffering
//!
//! Time-bounded and predicate-driven batching over lazy sequences.
//!
//! - [`buffer_time`] collects items and emits the batch when the window
//!   elapses since the last emission or, when a size cap is given, as soon
//!   as the cap is reached. The trailing non-empty batch is emitted on
//!   source completion. Timer state is owned by the operator body, so it
//!   is released on every exit path, including consumer abort and source
//!   failure.
//! - [`buffer_until`] appends each arriving item unconditionally after
//!   evaluating the async predicate over the current buffer and the item;
//!   a true predicate emits and resets the buffer. Predicate errors
//!   propagate. The trailing non-empty buffer is emitted on completion.

use std::future::Future;
use std::time::Duration;

use async_stream::try_stream;
use futures::StreamExt;
use tokio::time::{sleep, Instant};

use flowline_domain::{ItemStream, StageError, StageResult};

use super::operators::fail;

/// What the select loop observed in one turn.
enum Tick<T> {
    Item(StageResult<T>),
    Closed,
    Elapsed,
}

/// Collects items into time-bounded batches with an optional size cap.
/// Both bounds must be positive.
pub fn buffer_time<T>(source: ItemStream<T>, window: Duration, max_size: Option<usize>) -> ItemStream<Vec<T>>
where
    T: Send + 'static,
{
    if window.is_zero() {
        return fail(StageError::invalid_config("buffer window must be positive"));
    }
    if max_size == Some(0) {
        return fail(StageError::invalid_config("buffer max size must be positive"));
    }
    Box::pin(try_stream! {
        let mut source = source.fuse();
        let mut batch: Vec<T> = Vec::new();
        let timer = sleep(window);
        tokio::pin!(timer);
        loop {
            let tick = tokio::select! {
                item = source.next() => match item {
                    Some(item) => Tick::Item(item),
                    None => Tick::Closed,
                },
                _ = timer.as_mut() => Tick::Elapsed,
            };
            match tick {
                Tick::Item(item) => {
                    batch.push(item?);
                    if max_size.is_some_and(|cap| batch.len() >= cap) {
                        yield std::mem::take(&mut batch);
                        timer.as_mut().reset(Instant::now() + window);
                    }
                }
                Tick::Elapsed => {
                    if !batch.is_empty() {
                        yield std::mem::take(&mut batch);
                    }
                    timer.as_mut().reset(Instant::now() + window);
                }
                Tick::Closed => break,
            }
        }
        if !batch.is_empty() {
            yield batch;
        }
    })
}

/// Emits the buffer whenever the predicate, evaluated over the current
/// buffer and the arriving item, returns true. The item is appended
/// unconditionally; the emitted batch therefore includes it.
pub fn buffer_until<T, F, Fut>(source: ItemStream<T>, mut predicate: F) -> ItemStream<Vec<T>>
where
    T: Clone + Send + 'static,
    F: FnMut(Vec<T>, T) -> Fut + Send + 'static,
    Fut: Future<Output = StageResult<bool>> + Send,
{
    Box::pin(try_stream! {
        use futures::TryStreamExt;

        let mut source = source;
        let mut buffer: Vec<T> = Vec::new();
        while let Some(item) = source.try_next().await? {
            let emit = predicate(buffer.clone(), item.clone()).await?;
            buffer.push(item);
            if emit {
                yield std::mem::take(&mut buffer);
            }
        }
        if !buffer.is_empty() {
            yield buffer;
        }
    })
}
