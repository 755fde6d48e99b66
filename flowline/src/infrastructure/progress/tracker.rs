// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Tracker
//!
//! A subscribable view over the lifecycle events both engines publish:
//! per-step counters, overall completion ratio, throughput, and a remaining
//! -time estimate.
//!
//! ## Design
//!
//! - **Event-driven**: the tracker derives every counter from the nine
//!   progress event kinds; the engines publish, the tracker folds.
//! - **Synchronous delivery**: subscribers run inline at the publication
//!   point, in subscription order.
//! - **Isolation**: a panicking subscriber is contained and logged; it
//!   never disturbs the pipeline or other subscribers.
//! - **Cheap to share**: the tracker is a handle; clones observe the same
//!   run.
//!
//! ## ETA
//!
//! `average_throughput` is items processed per second of elapsed run time.
//! The remaining-time estimate extrapolates the mean completed-step
//! duration over the steps still pending; until a step completes there is
//! nothing to extrapolate from and the estimate is reported as absent
//! ("calculating").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use flowline_domain::{ProgressEvent, ProgressEventKind, ProgressSink};

/// Per-execution state of one step.
/// `PENDING → RUNNING → (COMPLETED | FAILED)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Counters for one step of the run.
#[derive(Debug, Clone, Default)]
pub struct StepProgress {
    name: String,
    status: StepStatus,
    input_count: u64,
    output_count: u64,
    error_count: u64,
    concurrency_limit: Option<usize>,
    last_error: Option<String>,
    started: Option<Instant>,
    duration_ms: Option<u64>,
}

impl StepProgress {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn input_count(&self) -> u64 {
        self.input_count
    }

    pub fn output_count(&self) -> u64 {
        self.output_count
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Items consumed but not yet yielded or failed, while the step runs.
    pub fn in_flight_count(&self) -> u64 {
        match self.status {
            StepStatus::Running => self.input_count.saturating_sub(self.output_count + self.error_count),
            _ => 0,
        }
    }

    pub fn concurrency_limit(&self) -> Option<usize> {
        self.concurrency_limit
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Output items per input item; 1 when nothing was consumed yet.
    pub fn expansion_ratio(&self) -> f64 {
        if self.input_count > 0 {
            self.output_count as f64 / self.input_count as f64
        } else {
            1.0
        }
    }
}

/// Overall run snapshot.
#[derive(Debug, Clone)]
pub struct OverallProgress {
    pub completed_steps: usize,
    pub total_steps: usize,
    pub progress_ratio: f64,
    pub is_complete: bool,
    pub has_failed: bool,
    pub current_step_name: Option<String>,
    pub average_throughput: f64,
    pub estimated_remaining_ms: Option<u64>,
    pub elapsed_ms: u64,
    pub total_errors: u64,
}

#[derive(Default)]
struct RunState {
    steps: Vec<StepProgress>,
    total_steps: usize,
    started: Option<Instant>,
    finished: Option<Instant>,
    has_failed: bool,
    total_items: u64,
    total_errors: u64,
}

impl RunState {
    fn step_mut(&mut self, name: &str) -> &mut StepProgress {
        if let Some(position) = self.steps.iter().position(|step| step.name == name) {
            return &mut self.steps[position];
        }
        self.steps.push(StepProgress::new(name));
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    fn fold(&mut self, event: &ProgressEvent) {
        match event.kind() {
            ProgressEventKind::PipelineStart => {
                if self.started.is_none() {
                    self.started = Some(Instant::now());
                }
            }
            ProgressEventKind::PipelineComplete => {
                self.finished = Some(Instant::now());
            }
            ProgressEventKind::PipelineError => {
                self.has_failed = true;
                self.finished = Some(Instant::now());
            }
            ProgressEventKind::StepStart => {
                if let Some(name) = event.step_name() {
                    let step = self.step_mut(name);
                    step.status = StepStatus::Running;
                    step.started = Some(Instant::now());
                }
            }
            ProgressEventKind::StepComplete => {
                if let Some(name) = event.step_name() {
                    let step = self.step_mut(name);
                    step.status = StepStatus::Completed;
                    step.duration_ms = step.started.map(|at| at.elapsed().as_millis() as u64);
                }
            }
            ProgressEventKind::StepError => {
                if let Some(name) = event.step_name() {
                    let rendered = event.error().map(str::to_string);
                    let step = self.step_mut(name);
                    step.status = StepStatus::Failed;
                    step.duration_ms = step.started.map(|at| at.elapsed().as_millis() as u64);
                    step.last_error = rendered;
                }
                self.has_failed = true;
            }
            ProgressEventKind::ItemProcessed => {
                if let Some(name) = event.step_name() {
                    self.step_mut(name).input_count += 1;
                }
                self.total_items += 1;
            }
            ProgressEventKind::ItemYielded => {
                if let Some(name) = event.step_name() {
                    self.step_mut(name).output_count += 1;
                }
            }
            ProgressEventKind::ItemError => {
                if let Some(name) = event.step_name() {
                    let rendered = event.error().map(str::to_string);
                    let step = self.step_mut(name);
                    step.error_count += 1;
                    step.last_error = rendered;
                }
                self.total_errors += 1;
            }
        }
    }
}

type Subscriber = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

#[derive(Default)]
struct TrackerInner {
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    next_subscriber_id: AtomicU64,
    run: RwLock<RunState>,
}

/// Handle over a shared progress view; clone freely.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

/// Unsubscribe handle returned by [`ProgressTracker::subscribe`].
pub struct ProgressSubscription {
    id: u64,
    inner: std::sync::Weak<TrackerInner>,
}

impl ProgressSubscription {
    /// Removes the subscriber; later events are no longer delivered to it.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.write().remove(&self.id);
        }
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber; events are delivered synchronously in
    /// subscription order. The returned handle unsubscribes.
    pub fn subscribe<F>(&self, subscriber: F) -> ProgressSubscription
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.write().insert(id, Arc::new(subscriber));
        ProgressSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Resets the run view for a new execution with a known step count.
    pub fn begin_run(&self, total_steps: usize) {
        let mut run = self.inner.run.write();
        *run = RunState {
            total_steps,
            started: Some(Instant::now()),
            ..RunState::default()
        };
    }

    /// Records a step's declared concurrency bound.
    pub fn note_step_concurrency(&self, step_name: &str, limit: Option<usize>) {
        self.inner.run.write().step_mut(step_name).concurrency_limit = limit;
    }

    /// Folds one event into the counters and delivers it to subscribers.
    /// Subscriber panics are contained and logged.
    pub fn publish(&self, event: &ProgressEvent) {
        self.inner.run.write().fold(event);

        let subscribers: Vec<Subscriber> = self.inner.subscribers.read().values().cloned().collect();
        for subscriber in subscribers {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| subscriber(event)));
            if outcome.is_err() {
                tracing::warn!(
                    component = "progress",
                    event = "subscriber_panicked",
                    kind = %event.kind(),
                    "progress subscriber panicked; isolated"
                );
            }
        }
    }

    /// Counters for one step, when it has been seen.
    pub fn step(&self, step_name: &str) -> Option<StepProgress> {
        self.inner
            .run
            .read()
            .steps
            .iter()
            .find(|step| step.name == step_name)
            .cloned()
    }

    /// Counters for every step, in first-seen order.
    pub fn steps(&self) -> Vec<StepProgress> {
        self.inner.run.read().steps.clone()
    }

    /// Overall snapshot of the run.
    pub fn snapshot(&self) -> OverallProgress {
        let run = self.inner.run.read();
        let completed_steps = run.steps.iter().filter(|s| s.status == StepStatus::Completed).count();
        let total_steps = run.total_steps.max(run.steps.len());
        let elapsed_ms = match (run.started, run.finished) {
            (Some(started), Some(finished)) => finished.duration_since(started).as_millis() as u64,
            (Some(started), None) => started.elapsed().as_millis() as u64,
            _ => 0,
        };
        let elapsed_secs = elapsed_ms as f64 / 1_000.0;
        let average_throughput = if elapsed_secs > 0.0 {
            run.total_items as f64 / elapsed_secs
        } else {
            0.0
        };
        let is_complete = run.finished.is_some() && !run.has_failed;
        let progress_ratio = if total_steps > 0 {
            (completed_steps as f64 / total_steps as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let estimated_remaining_ms = if completed_steps > 0 && completed_steps < total_steps && !run.has_failed {
            let mean_step_ms = elapsed_ms as f64 / completed_steps as f64;
            Some((mean_step_ms * (total_steps - completed_steps) as f64) as u64)
        } else {
            None
        };
        let current_step_name = run
            .steps
            .iter()
            .find(|s| s.status == StepStatus::Running)
            .map(|s| s.name.clone());

        OverallProgress {
            completed_steps,
            total_steps,
            progress_ratio,
            is_complete,
            has_failed: run.has_failed,
            current_step_name,
            average_throughput,
            estimated_remaining_ms,
            elapsed_ms,
            total_errors: run.total_errors,
        }
    }

    /// Renders a textual report: overall status plus one line per step.
    pub fn generate_summary(&self) -> String {
        let snapshot = self.snapshot();
        let status = if snapshot.has_failed {
            "failed"
        } else if snapshot.is_complete {
            "completed"
        } else {
            "running"
        };
        let mut lines = vec![format!(
            "pipeline {}: {}/{} steps, {:.0}% complete, {} errors, {} ms elapsed",
            status,
            snapshot.completed_steps,
            snapshot.total_steps,
            snapshot.progress_ratio * 100.0,
            snapshot.total_errors,
            snapshot.elapsed_ms
        )];
        for step in self.steps() {
            let duration = step
                .duration_ms()
                .map(|ms| format!("{} ms", ms))
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "  {} [{}] in={} out={} errors={} duration={}",
                step.name(),
                step.status(),
                step.input_count(),
                step.output_count(),
                step.error_count(),
                duration
            ));
        }
        lines.join("\n")
    }
}

impl ProgressSink for ProgressTracker {
    fn publish(&self, event: &ProgressEvent) {
        ProgressTracker::publish(self, event);
    }
}
