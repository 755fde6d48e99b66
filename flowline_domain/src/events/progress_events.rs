// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Events
//!
//! Domain events emitted by the batch and streaming engines as a pipeline
//! runs, consumed by the progress tracker and any user subscribers.
//!
//! ## Event Kinds
//!
//! Pipeline lifecycle (`pipeline:start`, `pipeline:complete`,
//! `pipeline:error`), step lifecycle (`step:start`, `step:complete`,
//! `step:error`), and item flow (`item:processed`, `item:yielded`,
//! `item:error`). Every event carries its wall-clock timestamp; step and
//! item events carry the step name; item events may carry the item index
//! and a rendered error.
//!
//! Events are immutable records of past occurrences and are delivered
//! synchronously to subscribers in publication order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::services::datetime_serde;

/// The nine progress event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressEventKind {
    PipelineStart,
    PipelineComplete,
    PipelineError,
    StepStart,
    StepComplete,
    StepError,
    ItemProcessed,
    ItemYielded,
    ItemError,
}

impl std::fmt::Display for ProgressEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressEventKind::PipelineStart => write!(f, "pipeline:start"),
            ProgressEventKind::PipelineComplete => write!(f, "pipeline:complete"),
            ProgressEventKind::PipelineError => write!(f, "pipeline:error"),
            ProgressEventKind::StepStart => write!(f, "step:start"),
            ProgressEventKind::StepComplete => write!(f, "step:complete"),
            ProgressEventKind::StepError => write!(f, "step:error"),
            ProgressEventKind::ItemProcessed => write!(f, "item:processed"),
            ProgressEventKind::ItemYielded => write!(f, "item:yielded"),
            ProgressEventKind::ItemError => write!(f, "item:error"),
        }
    }
}

/// A single progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    kind: ProgressEventKind,
    #[serde(with = "datetime_serde")]
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ProgressEvent {
    fn new(kind: ProgressEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            step_name: None,
            item_index: None,
            error: None,
        }
    }

    pub fn pipeline_start() -> Self {
        Self::new(ProgressEventKind::PipelineStart)
    }

    pub fn pipeline_complete() -> Self {
        Self::new(ProgressEventKind::PipelineComplete)
    }

    pub fn pipeline_error(error: &StageError) -> Self {
        Self::new(ProgressEventKind::PipelineError).with_error(error)
    }

    pub fn step_start(step_name: impl Into<String>) -> Self {
        Self::new(ProgressEventKind::StepStart).with_step(step_name)
    }

    pub fn step_complete(step_name: impl Into<String>) -> Self {
        Self::new(ProgressEventKind::StepComplete).with_step(step_name)
    }

    pub fn step_error(step_name: impl Into<String>, error: &StageError) -> Self {
        Self::new(ProgressEventKind::StepError).with_step(step_name).with_error(error)
    }

    pub fn item_processed(step_name: impl Into<String>, item_index: usize) -> Self {
        let mut event = Self::new(ProgressEventKind::ItemProcessed).with_step(step_name);
        event.item_index = Some(item_index);
        event
    }

    pub fn item_yielded(step_name: impl Into<String>) -> Self {
        Self::new(ProgressEventKind::ItemYielded).with_step(step_name)
    }

    pub fn item_error(step_name: impl Into<String>, item_index: usize, error: &StageError) -> Self {
        let mut event = Self::new(ProgressEventKind::ItemError).with_step(step_name).with_error(error);
        event.item_index = Some(item_index);
        event
    }

    fn with_step(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = Some(step_name.into());
        self
    }

    fn with_error(mut self, error: &StageError) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn kind(&self) -> ProgressEventKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn step_name(&self) -> Option<&str> {
        self.step_name.as_deref()
    }

    pub fn item_index(&self) -> Option<usize> {
        self.item_index
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Seam through which the engines publish progress events.
///
/// Implemented by the progress tracker; stage bodies and operators only see
/// this trait, never the tracker itself. Implementations must not block and
/// must isolate their own subscriber failures.
pub trait ProgressSink: Send + Sync {
    /// Delivers one event. Called synchronously from engine code.
    fn publish(&self, event: &ProgressEvent);
}
