// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Adapter Round Trips
//!
//! Projections between the batch and streaming surfaces: lifting a batch
//! stage into a stream, wrapping a streaming stage for collections, the
//! round-trip identity, batch-mode state restrictions, and hybrid stages
//! in both pipeline kinds.

use flowline::{
    codes, hybrid, to_batch, to_streaming, FnStage, FnStreamingStage, ItemStream, Pipeline, Stage, StageContext,
    StageError, StreamingPipeline,
};
use flowline_domain::{AccumulatedState, RunContext};

fn double_stage() -> FnStage<i64, i64> {
    FnStage::new("double_item", |ctx: StageContext<i64>| async move { Ok(ctx.input() * 2) })
}

fn doubling_stream_stage() -> FnStreamingStage<i64, i64> {
    FnStreamingStage::new("double_stream", |input: ItemStream<i64>, _ctx| {
        flowline::stream::map(input, |n: i64| async move { Ok(n * 2) })
    })
}

/// toBatch(toStreaming(f)) over an array equals direct application of f.
#[tokio::test]
async fn round_trip_matches_direct_application() {
    let round_tripped = to_batch(to_streaming(double_stage()));
    let ctx = StageContext::new((1..=6).collect::<Vec<i64>>(), AccumulatedState::new(), RunContext::empty());
    let outputs = round_tripped.execute(ctx).await.into_result().unwrap();
    assert_eq!(outputs, vec![2, 4, 6, 8, 10, 12]);
}

/// A lifted batch stage runs per item inside a streaming pipeline.
#[tokio::test]
async fn lifted_batch_stage_runs_per_item() {
    let pipeline = StreamingPipeline::<i64, i64>::start("lifted")
        .add("double", to_streaming(double_stage()))
        .unwrap();
    let items = pipeline.execute_to_vec(vec![1, 2, 3]).await.unwrap();
    assert_eq!(items, vec![2, 4, 6]);
}

/// A lifted failure is renamed `<stage> failed: <message>` and keeps the
/// original code.
#[tokio::test]
async fn lifted_failures_carry_the_stage_name() {
    let failing = FnStage::new("parse_row", |_ctx: StageContext<i64>| async move {
        Err::<i64, _>(StageError::from_message("connect ETIMEDOUT upstream"))
    });
    let pipeline = StreamingPipeline::<i64, i64>::start("lifted_failure")
        .add("parse", to_streaming(failing))
        .unwrap();

    let error = pipeline.execute_to_vec(vec![1]).await.unwrap_err();
    assert!(error.message().starts_with("parse_row failed:"));
    assert_eq!(error.code(), codes::ETIMEDOUT);
    assert!(error.retryable());
    assert!(error.cause().is_some());
}

/// A wrapped streaming stage drops into a batch pipeline.
#[tokio::test]
async fn wrapped_streaming_stage_runs_in_batch_mode() {
    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("wrapped")
        .add("double", to_batch(doubling_stream_stage()))
        .unwrap();
    let outcome = pipeline.execute(vec![5, 6]).await;
    assert_eq!(outcome.data().unwrap(), &vec![10, 12]);
}

/// Stream accessors on batch-mode state are rejected; accumulated
/// snapshots remain readable.
#[tokio::test]
async fn batch_mode_state_rejects_stream_access() {
    let probing = FnStreamingStage::new("probe_state", |input: ItemStream<i64>, ctx| {
        Box::pin(async_stream::try_stream! {
            let mut input = input;
            while let Some(item) = futures::TryStreamExt::try_next(&mut input).await? {
                let denied = ctx.state().stream::<i64>("anything");
                let message = denied.err().map(|error| error.message().to_string()).unwrap_or_default();
                if !message.contains("Stream access not supported in batch mode") {
                    Err::<i64, StageError>(StageError::from_message("stream access unexpectedly allowed"))?;
                }
                yield item;
            }
        }) as ItemStream<i64>
    });

    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("probing")
        .add("probe", to_batch(probing))
        .unwrap();
    let outcome = pipeline.execute(vec![1]).await;
    assert!(outcome.is_success());
}

/// Conversion failures surface as BATCH_CONVERSION_ERROR.
#[tokio::test]
async fn conversion_failures_are_coded() {
    let failing = FnStreamingStage::new("explode", |input: ItemStream<i64>, _ctx| {
        flowline::stream::map(input, |_n: i64| async move {
            Err::<i64, _>(StageError::from_message("mid-stream failure"))
        })
    });
    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("exploding")
        .add("explode", to_batch(failing))
        .unwrap();

    let outcome = pipeline.execute(vec![1]).await;
    let error = outcome.error().unwrap();
    assert_eq!(error.code(), codes::BATCH_CONVERSION_ERROR);
    assert!(error.cause().is_some());
}

/// One hybrid value serves both pipeline kinds.
#[tokio::test]
async fn hybrid_stages_project_onto_both_kinds() {
    let make_hybrid = || {
        hybrid(
            "negate",
            |ctx: StageContext<Vec<i64>>| async move { Ok(ctx.input().iter().map(|n| -n).collect::<Vec<i64>>()) },
            |input: ItemStream<i64>, _ctx| flowline::stream::map(input, |n: i64| async move { Ok(-n) }),
        )
    };

    let batch_pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("hybrid_batch")
        .add("negate", make_hybrid())
        .unwrap();
    assert_eq!(batch_pipeline.execute(vec![1, -2]).await.data().unwrap(), &vec![-1, 2]);

    let stream_pipeline = StreamingPipeline::<i64, i64>::start("hybrid_stream")
        .add("negate", make_hybrid())
        .unwrap();
    assert_eq!(stream_pipeline.execute_to_vec(vec![1, -2]).await.unwrap(), vec![-1, 2]);
}

/// The hybrid batch path wraps failures as HYBRID_STEP_ERROR.
#[tokio::test]
async fn hybrid_batch_failures_are_coded() {
    let failing = hybrid(
        "flaky",
        |_ctx: StageContext<Vec<i64>>| async move { Err::<Vec<i64>, _>(StageError::from_message("batch path boom")) },
        |input: ItemStream<i64>, _ctx| input,
    );
    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("hybrid_failure")
        .add("flaky", failing)
        .unwrap();

    let outcome = pipeline.execute(vec![1]).await;
    let error = outcome.error().unwrap();
    assert_eq!(error.code(), codes::HYBRID_STEP_ERROR);
    assert!(error.message().contains("flaky"));
}
