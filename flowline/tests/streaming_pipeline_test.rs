// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Streaming Pipeline Scenarios
//!
//! Lazy execution, windowed aggregation, cooperative early termination
//! with source cleanup, checkpoint/retain state views, and failure
//! propagation at the consumer's pull point.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;

use flowline::{FnStreamingStage, ItemStream, ParallelOptions, StageError, StreamingPipeline};

/// Source that counts how many items the pipeline actually pulls.
fn counted_source(n: usize, pulled: Arc<AtomicUsize>) -> ItemStream<i64> {
    Box::pin(try_stream! {
        for i in 0..n {
            pulled.fetch_add(1, Ordering::SeqCst);
            yield i as i64;
        }
    })
}

/// A consumer that stops after ten items pulls exactly ten source items.
#[tokio::test]
async fn early_termination_pulls_exactly_what_was_consumed() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let processed = Arc::new(AtomicUsize::new(0));
    let observer = Arc::clone(&processed);

    let pipeline = StreamingPipeline::<i64, i64>::start("doubler")
        .map("double", move |n| {
            let observer = Arc::clone(&observer);
            async move {
                observer.fetch_add(1, Ordering::SeqCst);
                Ok(n * 2)
            }
        })
        .unwrap();

    let mut output = pipeline.execute(counted_source(1_000, Arc::clone(&pulled)));
    let mut received = Vec::new();
    while let Some(item) = output.next().await {
        received.push(item.unwrap());
        if received.len() == 10 {
            break;
        }
    }
    drop(output);

    assert_eq!(received, (0..10).map(|n| n * 2).collect::<Vec<i64>>());
    assert_eq!(pulled.load(Ordering::SeqCst), 10);
    assert_eq!(processed.load(Ordering::SeqCst), 10);
}

/// Tumbling windows of two over [1..5], summed: [3, 7].
#[tokio::test]
async fn tumbling_windows_then_map_sums() {
    let pipeline = StreamingPipeline::<i64, i64>::start("windows")
        .window("pairs", 2)
        .unwrap()
        .map("sum", |window: Vec<i64>| async move { Ok(window.iter().sum::<i64>()) })
        .unwrap();

    let sums = pipeline.execute_to_vec((1..=5).collect::<Vec<i64>>()).await.unwrap();
    assert_eq!(sums, vec![3, 7]);
}

/// Nothing runs until the output sequence is consumed.
#[tokio::test]
async fn execution_is_lazy_until_consumption() {
    let ran = Arc::new(AtomicUsize::new(0));
    let observer = Arc::clone(&ran);

    let pipeline = StreamingPipeline::<i64, i64>::start("lazy")
        .tap("observe", move |_n| {
            let observer = Arc::clone(&observer);
            async move {
                observer.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

    let output = pipeline.execute(vec![1, 2, 3]);
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    let items = flowline::stream::to_vec(output).await.unwrap();
    assert_eq!(items, vec![1, 2, 3]);
    assert_eq!(ran.load(Ordering::SeqCst), 3);
}

/// A transform error surfaces at the consumer's pull point and stops
/// the source.
#[tokio::test]
async fn transform_errors_stop_the_flow() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let pipeline = StreamingPipeline::<i64, i64>::start("failing")
        .map("explode_at_three", |n| async move {
            if n == 3 {
                Err(StageError::from_message("boom at three"))
            } else {
                Ok(n)
            }
        })
        .unwrap();

    let mut output = pipeline.execute(counted_source(1_000, Arc::clone(&pulled)));
    let mut received = Vec::new();
    let error = loop {
        match output.next().await {
            Some(Ok(item)) => received.push(item),
            Some(Err(error)) => break error,
            None => panic!("stream ended without the expected error"),
        }
    };
    drop(output);

    assert_eq!(received, vec![0, 1, 2]);
    assert!(error.message().contains("boom at three"));
    assert_eq!(pulled.load(Ordering::SeqCst), 4);
}

/// Checkpointed output is visible downstream as an accumulated snapshot.
#[tokio::test]
async fn checkpoint_snapshots_are_visible_downstream() {
    let pipeline = StreamingPipeline::<i64, i64>::start("checkpointed")
        .map("double", |n| async move { Ok(n * 2) })
        .unwrap()
        .checkpoint("doubled")
        .unwrap()
        .add(
            "against_snapshot",
            FnStreamingStage::new("against_snapshot", |input: ItemStream<i64>, ctx| {
                Box::pin(try_stream! {
                    let mut input = input;
                    while let Some(item) = futures::TryStreamExt::try_next(&mut input).await? {
                        let snapshot_len = ctx
                            .state()
                            .accumulated::<Vec<i64>>("doubled")
                            .map(|snapshot| snapshot.len())
                            .unwrap_or_default();
                        yield item * snapshot_len as i64;
                    }
                }) as ItemStream<i64>
            }),
        )
        .unwrap();

    let items = pipeline.execute_to_vec(vec![1, 2, 3]).await.unwrap();
    // Snapshot holds [2, 4, 6]; each doubled item is scaled by its length
    assert_eq!(items, vec![6, 12, 18]);
}

/// A retained stage's items are readable once through the stream view
/// after the retained section has flowed.
#[tokio::test]
async fn retained_streams_replay_through_state() {
    let pipeline = StreamingPipeline::<i64, i64>::start("retained")
        .map("double", |n| async move { Ok(n * 2) })
        .unwrap()
        .retain("doubled")
        .unwrap()
        .add(
            "replay",
            FnStreamingStage::new("replay", |input: ItemStream<i64>, ctx| {
                Box::pin(try_stream! {
                    let mut input = input;
                    let mut count = 0i64;
                    while let Some(_item) = futures::TryStreamExt::try_next(&mut input).await? {
                        count += 1;
                    }
                    let mut retained = ctx.state().stream::<i64>("doubled")?.expect("retained buffer");
                    while let Some(item) = futures::TryStreamExt::try_next(&mut retained).await? {
                        yield item;
                    }
                    yield count;
                }) as ItemStream<i64>
            }),
        )
        .unwrap();

    let mut output = pipeline.execute(vec![1, 2, 3]);
    let mut items = Vec::new();
    while let Some(item) = output.next().await {
        items.push(item.unwrap());
    }
    assert_eq!(items, vec![2, 4, 6, 3]);
}

/// Parallel map inside the streaming pipeline preserves order by default.
#[tokio::test]
async fn parallel_map_stage_preserves_order() {
    let pipeline = StreamingPipeline::<i64, i64>::start("parallel")
        .map_parallel(
            "slow_square",
            |n| async move {
                tokio::time::sleep(std::time::Duration::from_millis((10 - n) as u64)).await;
                Ok(n * n)
            },
            ParallelOptions::ordered(4),
        )
        .unwrap();

    let squares = pipeline.execute_to_vec((1..=9).collect::<Vec<i64>>()).await.unwrap();
    assert_eq!(squares, (1..=9).map(|n| n * n).collect::<Vec<i64>>());
}

/// Duplicate stage keys are rejected at construction.
#[tokio::test]
async fn duplicate_keys_are_rejected() {
    let pipeline = StreamingPipeline::<i64, i64>::start("dup")
        .map("double", |n| async move { Ok(n * 2) })
        .unwrap();
    assert!(pipeline.map("double", |n| async move { Ok(n + 1) }).is_err());
}

/// The built transformer is reusable across inputs.
#[tokio::test]
async fn build_returns_a_reusable_transformer() {
    let pipeline = StreamingPipeline::<i64, i64>::start("reusable")
        .map("increment", |n| async move { Ok(n + 1) })
        .unwrap();
    let transform = pipeline.build();

    let first = flowline::stream::to_vec(transform(flowline::stream::from_vec(vec![1, 2]))).await.unwrap();
    let second = flowline::stream::to_vec(transform(flowline::stream::from_vec(vec![10]))).await.unwrap();
    assert_eq!(first, vec![2, 3]);
    assert_eq!(second, vec![11]);
}

/// reduce folds the lazy output without materializing it.
#[tokio::test]
async fn reduce_folds_the_output() {
    let pipeline = StreamingPipeline::<i64, i64>::start("folding")
        .map("double", |n| async move { Ok(n * 2) })
        .unwrap();

    let total = pipeline
        .reduce((1..=4).collect::<Vec<i64>>(), 0i64, |acc, n| async move { Ok(acc + n) })
        .await
        .unwrap();
    assert_eq!(total, 20);
}
