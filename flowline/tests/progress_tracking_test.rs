// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Tracking End to End
//!
//! The tracker observed through real pipeline runs: event ordering,
//! counter aggregation, duration accounting, and the textual summary.

use std::sync::Arc;

use parking_lot::Mutex;

use flowline::{
    ErrorStrategy, ListOptions, Pipeline, ProgressEventKind, ProgressTracker, StageError, StreamingPipeline,
};

/// Subscribers observe the batch lifecycle in publication order.
#[tokio::test]
async fn batch_lifecycle_events_arrive_in_order() {
    let tracker = ProgressTracker::new();
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    let subscription = tracker.subscribe(move |event| sink.lock().push(event.kind()));

    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("observed")
        .map("double", |n: i64| async move { Ok(n * 2) })
        .unwrap()
        .map("increment", |n: i64| async move { Ok(n + 1) })
        .unwrap()
        .with_tracker(tracker.clone());

    pipeline.execute(vec![1, 2]).await;
    subscription.unsubscribe();

    let observed = kinds.lock().clone();
    assert_eq!(observed.first(), Some(&ProgressEventKind::PipelineStart));
    assert_eq!(observed.last(), Some(&ProgressEventKind::PipelineComplete));

    let step_starts: Vec<usize> = observed
        .iter()
        .enumerate()
        .filter(|(_, kind)| **kind == ProgressEventKind::StepStart)
        .map(|(position, _)| position)
        .collect();
    let step_completes: Vec<usize> = observed
        .iter()
        .enumerate()
        .filter(|(_, kind)| **kind == ProgressEventKind::StepComplete)
        .map(|(position, _)| position)
        .collect();
    assert_eq!(step_starts.len(), 2);
    assert_eq!(step_completes.len(), 2);
    // Stages run strictly one after the other
    assert!(step_completes[0] < step_starts[1]);
}

/// Step durations never exceed the overall elapsed time.
#[tokio::test]
async fn step_durations_fit_inside_the_run() {
    let tracker = ProgressTracker::new();
    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("timed")
        .map("slow", |n: i64| async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            Ok(n)
        })
        .unwrap()
        .with_tracker(tracker.clone());

    let outcome = pipeline.execute(vec![1, 2, 3]).await;
    assert!(outcome.is_success());

    let snapshot = tracker.snapshot();
    let step_total: u64 = tracker.steps().iter().filter_map(|step| step.duration_ms()).sum();
    assert!(step_total <= snapshot.elapsed_ms + 5);
    assert!(snapshot.is_complete);
    assert_eq!(snapshot.progress_ratio, 1.0);
}

/// A failing stage marks the step and the run, and the error reaches
/// subscribers.
#[tokio::test]
async fn failures_reach_the_tracker_and_subscribers() {
    let tracker = ProgressTracker::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let _subscription = tracker.subscribe(move |event| {
        if event.kind() == ProgressEventKind::PipelineError {
            sink.lock().push(event.error().unwrap_or_default().to_string());
        }
    });

    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("failing")
        .map("explode", |_n: i64| async move {
            Err::<i64, _>(StageError::from_message("item exploded"))
        })
        .unwrap()
        .with_tracker(tracker.clone());

    let outcome = pipeline.execute(vec![1]).await;
    assert!(!outcome.is_success());

    let snapshot = tracker.snapshot();
    assert!(snapshot.has_failed);
    assert!(!snapshot.is_complete);
    assert!(errors.lock()[0].contains("item exploded"));

    let summary = tracker.generate_summary();
    assert!(summary.contains("failed"));
}

/// Item counters aggregate across skip-failed list processing.
#[tokio::test]
async fn item_counters_aggregate_per_step() {
    let tracker = ProgressTracker::new();
    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("counted")
        .map_with(
            "reject_evens",
            |n: i64| async move {
                if n % 2 == 0 {
                    Err(StageError::from_message(format!("even: {}", n)))
                } else {
                    Ok(n)
                }
            },
            ListOptions::sequential(ErrorStrategy::SkipFailed),
        )
        .unwrap()
        .with_tracker(tracker.clone());

    pipeline.execute((1..=6).collect()).await;

    let step = tracker.step("map(reject_evens)").unwrap();
    assert_eq!(step.input_count(), 3);
    assert_eq!(step.error_count(), 3);
    assert!(step.last_error().unwrap().contains("even"));
}

/// Streaming consumption feeds the tracker per yielded item.
#[tokio::test]
async fn streaming_runs_count_yields() {
    let tracker = ProgressTracker::new();
    let pipeline = StreamingPipeline::<i64, i64>::start("streamed")
        .map("double", |n| async move { Ok(n * 2) })
        .unwrap()
        .with_tracker(tracker.clone());

    let items = pipeline.execute_to_vec((1..=5).collect::<Vec<i64>>()).await.unwrap();
    assert_eq!(items.len(), 5);

    let snapshot = tracker.snapshot();
    assert!(snapshot.is_complete);
    assert_eq!(tracker.step("map(double)").unwrap().output_count(), 5);
    assert!(snapshot.average_throughput >= 0.0);
}
