// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generator Primitives
//!
//! Pull-based operators over [`ItemStream`] lazy sequences: transformation
//! (`map`, `filter`, `flat_map`, `tap`), slicing (`take`, `skip`,
//! `take_while`, `skip_while`), grouping (`batch`), and the source/sink
//! helpers (`once`, `from_vec`, `from_iter`, `empty`, `fail`, `to_vec`).
//!
//! ## Contracts
//!
//! Every operator:
//!
//! - preserves the source's item order;
//! - pulls from the source only as the consumer pulls from it (an aborted
//!   consumer drops the chain, which drops the source and runs its
//!   cleanup);
//! - propagates errors from the source or the transform immediately, and
//!   pulls nothing further afterwards.
//!
//! Transforms are async and fallible: they return a
//! [`StageResult`](flowline_domain::StageResult), so a failing transform
//! terminates the sequence at the consumer's pull point.
//!
//! ## Usage Examples
//!
//! ```
//! use flowline::stream::{from_vec, map, to_vec};
//!
//! # futures::executor::block_on(async {
//! let doubled = map(from_vec(vec![1, 2, 3]), |n: i64| async move { Ok(n * 2) });
//! assert_eq!(to_vec(doubled).await.unwrap(), vec![2, 4, 6]);
//! # });
//! ```

use std::future::Future;

use async_stream::try_stream;
use futures::TryStreamExt;

use flowline_domain::{ItemStream, StageError, StageResult};

/// A sequence over an in-memory vector.
pub fn from_vec<T: Send + 'static>(items: Vec<T>) -> ItemStream<T> {
    Box::pin(futures::stream::iter(items.into_iter().map(Ok)))
}

/// A sequence over any iterator.
pub fn from_iter<I>(items: I) -> ItemStream<I::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    Box::pin(futures::stream::iter(items.into_iter().map(Ok)))
}

/// A singleton sequence; the coercion for single-value pipeline input.
pub fn once<T: Send + 'static>(value: T) -> ItemStream<T> {
    from_vec(vec![value])
}

/// A sequence that completes immediately.
pub fn empty<T: Send + 'static>() -> ItemStream<T> {
    Box::pin(futures::stream::empty())
}

/// A sequence that fails at the first pull. Used to surface invalid
/// operator arguments at the consumer's pull point.
pub fn fail<T: Send + 'static>(error: StageError) -> ItemStream<T> {
    Box::pin(futures::stream::once(async move { Err(error) }))
}

/// Materializes a sequence, stopping at the first error.
pub async fn to_vec<T: Send + 'static>(stream: ItemStream<T>) -> StageResult<Vec<T>> {
    stream.try_collect().await
}

/// Transforms each item, preserving order.
pub fn map<T, U, F, Fut>(source: ItemStream<T>, mut f: F) -> ItemStream<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = StageResult<U>> + Send,
{
    Box::pin(try_stream! {
        let mut source = source;
        while let Some(item) = source.try_next().await? {
            yield f(item).await?;
        }
    })
}

/// Keeps items the async predicate accepts. The predicate receives the
/// item by value; items are `Clone` so the kept value is yielded intact.
pub fn filter<T, F, Fut>(source: ItemStream<T>, mut predicate: F) -> ItemStream<T>
where
    T: Clone + Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = StageResult<bool>> + Send,
{
    Box::pin(try_stream! {
        let mut source = source;
        while let Some(item) = source.try_next().await? {
            if predicate(item.clone()).await? {
                yield item;
            }
        }
    })
}

/// Expands each item into zero or more outputs, concatenated in source
/// order.
pub fn flat_map<T, U, F, Fut>(source: ItemStream<T>, mut f: F) -> ItemStream<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = StageResult<Vec<U>>> + Send,
{
    Box::pin(try_stream! {
        let mut source = source;
        while let Some(item) = source.try_next().await? {
            for output in f(item).await? {
                yield output;
            }
        }
    })
}

/// Runs a side effect per item, yielding items unchanged.
pub fn tap<T, F, Fut>(source: ItemStream<T>, mut f: F) -> ItemStream<T>
where
    T: Clone + Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = StageResult<()>> + Send,
{
    Box::pin(try_stream! {
        let mut source = source;
        while let Some(item) = source.try_next().await? {
            f(item.clone()).await?;
            yield item;
        }
    })
}

/// Yields at most the first `n` items, then stops pulling the source.
/// `take(0)` yields nothing and pulls nothing.
pub fn take<T: Send + 'static>(source: ItemStream<T>, n: usize) -> ItemStream<T> {
    if n == 0 {
        return empty();
    }
    Box::pin(try_stream! {
        let mut source = source;
        let mut taken = 0usize;
        while let Some(item) = source.try_next().await? {
            yield item;
            taken += 1;
            if taken == n {
                break;
            }
        }
    })
}

/// Discards the first `n` items.
pub fn skip<T: Send + 'static>(source: ItemStream<T>, n: usize) -> ItemStream<T> {
    Box::pin(try_stream! {
        let mut source = source;
        let mut skipped = 0usize;
        while let Some(item) = source.try_next().await? {
            if skipped < n {
                skipped += 1;
                continue;
            }
            yield item;
        }
    })
}

/// Yields items while the predicate holds, then stops pulling the source.
pub fn take_while<T, F, Fut>(source: ItemStream<T>, mut predicate: F) -> ItemStream<T>
where
    T: Clone + Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = StageResult<bool>> + Send,
{
    Box::pin(try_stream! {
        let mut source = source;
        while let Some(item) = source.try_next().await? {
            if !predicate(item.clone()).await? {
                break;
            }
            yield item;
        }
    })
}

/// Discards items while the predicate holds, then yields everything.
pub fn skip_while<T, F, Fut>(source: ItemStream<T>, mut predicate: F) -> ItemStream<T>
where
    T: Clone + Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = StageResult<bool>> + Send,
{
    Box::pin(try_stream! {
        let mut source = source;
        let mut skipping = true;
        while let Some(item) = source.try_next().await? {
            if skipping {
                if predicate(item.clone()).await? {
                    continue;
                }
                skipping = false;
            }
            yield item;
        }
    })
}

/// Groups items into fixed-size batches. The final batch may be short; an
/// empty source yields nothing.
pub fn batch<T: Send + 'static>(source: ItemStream<T>, size: usize) -> ItemStream<Vec<T>> {
    if size == 0 {
        return fail(StageError::invalid_config("batch size must be at least 1"));
    }
    Box::pin(try_stream! {
        let mut source = source;
        let mut group: Vec<T> = Vec::with_capacity(size);
        while let Some(item) = source.try_next().await? {
            group.push(item);
            if group.len() == size {
                yield std::mem::replace(&mut group, Vec::with_capacity(size));
            }
        }
        if !group.is_empty() {
            yield group;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Source that counts how many items were actually pulled.
    fn counted_source(n: usize, pulled: Arc<AtomicUsize>) -> ItemStream<usize> {
        Box::pin(try_stream! {
            for i in 0..n {
                pulled.fetch_add(1, Ordering::SeqCst);
                yield i;
            }
        })
    }

    #[tokio::test]
    async fn map_preserves_order() {
        let doubled = map(from_vec(vec![1, 2, 3]), |n: i64| async move { Ok(n * 2) });
        assert_eq!(to_vec(doubled).await.unwrap(), vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn map_propagates_transform_errors() {
        let stream = map(from_vec(vec![1, 2, 3]), |n: i64| async move {
            if n == 2 {
                Err(StageError::from_message("boom"))
            } else {
                Ok(n)
            }
        });
        assert!(to_vec(stream).await.is_err());
    }

    #[tokio::test]
    async fn filter_keeps_matching_items() {
        let evens = filter(from_vec(vec![1, 2, 3, 4]), |n: i64| async move { Ok(n % 2 == 0) });
        assert_eq!(to_vec(evens).await.unwrap(), vec![2, 4]);
    }

    #[tokio::test]
    async fn flat_map_concatenates_in_source_order() {
        let expanded = flat_map(from_vec(vec![1, 3]), |n: i64| async move { Ok(vec![n, n + 1]) });
        assert_eq!(to_vec(expanded).await.unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn tap_observes_without_changing_items() {
        let seen = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&seen);
        let tapped = tap(from_vec(vec![1, 2, 3]), move |_n: i64| {
            let observer = Arc::clone(&observer);
            async move {
                observer.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        assert_eq!(to_vec(tapped).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn take_zero_pulls_nothing() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let taken = take(counted_source(100, Arc::clone(&pulled)), 0);
        assert!(to_vec(taken).await.unwrap().is_empty());
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn take_stops_pulling_after_n() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let taken = take(counted_source(1_000, Arc::clone(&pulled)), 10);
        assert_eq!(to_vec(taken).await.unwrap().len(), 10);
        assert_eq!(pulled.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn skip_and_slices() {
        let skipped = skip(from_vec(vec![1, 2, 3, 4, 5]), 2);
        assert_eq!(to_vec(skipped).await.unwrap(), vec![3, 4, 5]);

        let while_small = take_while(from_vec(vec![1, 2, 9, 1]), |n: i64| async move { Ok(n < 5) });
        assert_eq!(to_vec(while_small).await.unwrap(), vec![1, 2]);

        let after_small = skip_while(from_vec(vec![1, 2, 9, 1]), |n: i64| async move { Ok(n < 5) });
        assert_eq!(to_vec(after_small).await.unwrap(), vec![9, 1]);
    }

    #[tokio::test]
    async fn batch_groups_with_short_tail() {
        let batched = batch(from_vec(vec![1, 2, 3, 4, 5]), 2);
        assert_eq!(to_vec(batched).await.unwrap(), vec![vec![1, 2], vec![3, 4], vec![5]]);

        let empty_src: ItemStream<i64> = empty();
        assert!(to_vec(batch(empty_src, 3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_rejects_zero_size() {
        let batched = batch(from_vec(vec![1]), 0);
        assert!(to_vec(batched).await.is_err());
    }

    #[tokio::test]
    async fn dropping_the_chain_stops_the_source() {
        use futures::StreamExt;

        let pulled = Arc::new(AtomicUsize::new(0));
        let mut doubled = map(counted_source(1_000, Arc::clone(&pulled)), |n: usize| async move { Ok(n * 2) });
        let mut received = 0usize;
        while let Some(item) = doubled.next().await {
            item.unwrap();
            received += 1;
            if received == 10 {
                break;
            }
        }
        drop(doubled);
        assert_eq!(pulled.load(Ordering::SeqCst), 10);
    }
}
