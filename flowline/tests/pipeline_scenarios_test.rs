// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Batch Pipeline Scenarios
//!
//! End-to-end workflows through the batch engine: an ETL chain with
//! enrichment and summary, grouped aggregation over batches, skip-failed
//! degradation across stages, parallel fan-out with a fan-in summary, and
//! error aggregation.

use std::collections::HashMap;

use flowline::{
    codes, ErrorStrategy, FnStage, ListOptions, Pipeline, ProgressTracker, StageContext, StageError,
};
use flowline_domain::value_objects::ConcurrencyLimit;

#[derive(Debug, Clone, PartialEq)]
struct Reading {
    value: f64,
    category: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
struct Summary {
    total: usize,
    by_category: HashMap<&'static str, usize>,
}

/// Text to summary: split lines, parse floats, enrich with a category,
/// keep positives, summarize.
#[tokio::test]
async fn etl_chain_produces_the_expected_summary() {
    let pipeline = Pipeline::<String, String>::start("etl")
        .add(
            "split",
            FnStage::new("split_lines", |ctx: StageContext<String>| async move {
                Ok(ctx.input().lines().map(str::to_string).collect::<Vec<String>>())
            }),
        )
        .unwrap()
        .map("parse", |line: String| async move {
            line.trim().parse::<f64>().map_err(|parse_error| StageError::from_cause(&parse_error))
        })
        .unwrap()
        .map("enrich", |value: f64| async move {
            let category = if value < 10.0 {
                "low"
            } else if value < 50.0 {
                "medium"
            } else {
                "high"
            };
            Ok(Reading { value, category })
        })
        .unwrap()
        .filter("keep_positive", |reading: Reading| async move { Ok(reading.value > 0.0) })
        .unwrap()
        .add(
            "summarize",
            FnStage::new("summarize", |ctx: StageContext<Vec<Reading>>| async move {
                let mut by_category: HashMap<&'static str, usize> = HashMap::new();
                for reading in ctx.input() {
                    *by_category.entry(reading.category).or_insert(0) += 1;
                }
                Ok(Summary {
                    total: ctx.input().len(),
                    by_category,
                })
            }),
        )
        .unwrap();

    let outcome = pipeline
        .execute("5.5\n12.3\n67.8\n0.0\n34.2\n100.5".to_string())
        .await;
    let summary = outcome.data().expect("etl pipeline succeeds");
    assert_eq!(summary.total, 5);
    assert_eq!(summary.by_category["low"], 1);
    assert_eq!(summary.by_category["medium"], 2);
    assert_eq!(summary.by_category["high"], 2);
}

/// Double each item, group into batches of three, sum each batch, total.
#[tokio::test]
async fn doubling_over_batches_totals_110() {
    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("batched_sums")
        .map("double", |n: i64| async move { Ok(n * 2) })
        .unwrap()
        .batch("group", 3)
        .unwrap()
        .map("sum_batch", |batch: Vec<i64>| async move { Ok(batch.iter().sum::<i64>()) })
        .unwrap()
        .add(
            "total",
            FnStage::new("total", |ctx: StageContext<Vec<i64>>| async move {
                let batch_count = ctx
                    .state()
                    .get::<Vec<Vec<i64>>>("group")
                    .map(Vec::len)
                    .unwrap_or_default();
                Ok((ctx.input().iter().sum::<i64>(), batch_count))
            }),
        )
        .unwrap();

    let outcome = pipeline.execute((1..=10).collect()).await;
    let (total, batch_count) = outcome.data().expect("pipeline succeeds");
    assert_eq!(*total, 110);
    assert_eq!(*batch_count, 4);
}

/// SKIP_FAILED at every stage: failures drop out, survivors flow on.
///
/// Stage one doubles odd inputs and rejects evens; stage two adds five
/// and rejects anything that arrives at ten or more. The upstream test
/// suite this scenario was lifted from asserted a third survivor (15),
/// which its own stage semantics cannot produce; the repaired
/// expectation is the two survivors below.
#[tokio::test]
async fn skip_failed_across_stages_keeps_the_survivors() {
    let options = || ListOptions::sequential(ErrorStrategy::SkipFailed);
    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("degrading")
        .map_with(
            "double_odds",
            |n: i64| async move {
                if n % 2 == 0 {
                    Err(StageError::from_message(format!("even input: {}", n)))
                } else {
                    Ok(n * 2)
                }
            },
            options(),
        )
        .unwrap()
        .map_with(
            "add_five",
            |n: i64| async move {
                if n >= 10 {
                    Err(StageError::from_message(format!("input too large: {}", n)))
                } else {
                    Ok(n + 5)
                }
            },
            options(),
        )
        .unwrap();

    let outcome = pipeline.execute((1..=7).collect()).await;
    assert_eq!(outcome.data().expect("skip-failed never fails the stage"), &vec![7, 11]);

    let meta = outcome.meta();
    assert!(meta.duration_ms() < 10_000);
}

/// Square in parallel with concurrency five, then fan in to statistics.
#[tokio::test]
async fn parallel_fan_out_fans_into_statistics() {
    #[derive(Debug, Clone, PartialEq)]
    struct Stats {
        count: usize,
        sum: i64,
        min: i64,
        max: i64,
    }

    let tracker = ProgressTracker::new();
    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("fan")
        .map_with(
            "square",
            |n: i64| async move { Ok(n * n) },
            ListOptions::parallel(ErrorStrategy::FailFast, ConcurrencyLimit::new(5).unwrap()),
        )
        .unwrap()
        .add(
            "stats",
            FnStage::new("stats", |ctx: StageContext<Vec<i64>>| async move {
                let squares = ctx.input();
                Ok(Stats {
                    count: squares.len(),
                    sum: squares.iter().sum(),
                    min: *squares.iter().min().expect("non-empty"),
                    max: *squares.iter().max().expect("non-empty"),
                })
            }),
        )
        .unwrap()
        .with_tracker(tracker.clone());

    let outcome = pipeline.execute((1..=10).collect()).await;
    assert_eq!(
        outcome.data().expect("fan pipeline succeeds"),
        &Stats {
            count: 10,
            sum: 385,
            min: 1,
            max: 100,
        }
    );

    let snapshot = tracker.snapshot();
    assert!(snapshot.is_complete);
    assert_eq!(snapshot.completed_steps, 2);
    assert_eq!(tracker.step("map(square)").unwrap().input_count(), 10);
}

/// COLLECT_ERRORS surfaces an aggregate with per-item failures.
#[tokio::test]
async fn collect_errors_reports_the_aggregate() {
    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start("collecting")
        .map_with(
            "reject_evens",
            |n: i64| async move {
                if n % 2 == 0 {
                    Err(StageError::from_message(format!("even input: {}", n)))
                } else {
                    Ok(n)
                }
            },
            ListOptions::sequential(ErrorStrategy::CollectErrors),
        )
        .unwrap();

    let outcome = pipeline.execute((1..=5).collect()).await;
    let error = outcome.error().expect("aggregate failure");
    assert_eq!(error.code(), codes::LIST_PROCESSING_ERRORS);
    assert_eq!(error.message(), "2 of 5 items failed");
    let indices: Vec<usize> = error.item_failures().iter().map(|failure| failure.index).collect();
    assert_eq!(indices, vec![1, 3]);

    let list = outcome.meta().list_metadata().expect("list telemetry on failure");
    assert_eq!(list.success_count(), 3);
    assert_eq!(list.failure_count(), 2);
    assert_eq!(list.total_items(), 5);
}

/// The run context built per execution is visible to every stage.
#[tokio::test]
async fn context_builder_supplies_run_scoped_config() {
    #[derive(Debug)]
    struct RunConfig {
        multiplier: i64,
    }

    let pipeline = Pipeline::<Vec<i64>, Vec<i64>>::start_with_context("configured", || async {
        Ok(flowline::RunContext::of(RunConfig { multiplier: 3 }))
    })
    .add(
        "scale",
        FnStage::new("scale", |ctx: StageContext<Vec<i64>>| async move {
            let multiplier = ctx.run().get::<RunConfig>().map(|config| config.multiplier).unwrap_or(1);
            Ok(ctx.input().iter().map(|n| n * multiplier).collect::<Vec<i64>>())
        }),
    )
    .unwrap();

    let outcome = pipeline.execute(vec![1, 2]).await;
    assert_eq!(outcome.data().unwrap(), &vec![3, 6]);
}
