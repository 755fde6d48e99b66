// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Outcome
//!
//! The sum-typed result of a stage invocation: exactly one of data or error,
//! with metadata always present. Batch executions never raise; they return a
//! [`StageOutcome`] whose error side carries the failing stage's error and
//! aggregate metadata.
//!
//! [`StageReport`] is the raw stage-body return (a plain result plus the
//! optional list-operation telemetry) that the engine wraps into an
//! outcome after stamping timing and correlation ids.

use crate::entities::stage_metadata::{ListOperationMetadata, StageMetadata};
use crate::error::StageError;

/// What a stage body hands back to the engine: the result and, when the
/// stage processed a collection, the list-operation aggregates.
#[derive(Debug, Clone)]
pub struct StageReport<T> {
    result: Result<T, StageError>,
    list_metadata: Option<ListOperationMetadata>,
}

impl<T> StageReport<T> {
    /// A successful report with no list telemetry.
    pub fn ok(data: T) -> Self {
        Self {
            result: Ok(data),
            list_metadata: None,
        }
    }

    /// A failed report with no list telemetry.
    pub fn err(error: StageError) -> Self {
        Self {
            result: Err(error),
            list_metadata: None,
        }
    }

    /// Attaches list-operation telemetry to the report.
    pub fn with_list_metadata(mut self, list_metadata: ListOperationMetadata) -> Self {
        self.list_metadata = Some(list_metadata);
        self
    }

    pub fn result(&self) -> Result<&T, &StageError> {
        self.result.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn list_metadata(&self) -> Option<&ListOperationMetadata> {
        self.list_metadata.as_ref()
    }

    pub fn into_result(self) -> Result<T, StageError> {
        self.result
    }

    /// Splits the report into its result and telemetry.
    pub fn into_parts(self) -> (Result<T, StageError>, Option<ListOperationMetadata>) {
        (self.result, self.list_metadata)
    }

    /// Maps the success value, keeping telemetry and errors untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageReport<U> {
        StageReport {
            result: self.result.map(f),
            list_metadata: self.list_metadata,
        }
    }
}

impl<T> From<Result<T, StageError>> for StageReport<T> {
    fn from(result: Result<T, StageError>) -> Self {
        Self {
            result,
            list_metadata: None,
        }
    }
}

/// The engine-produced outcome of a stage or pipeline invocation.
///
/// ## Invariant
///
/// Exactly one of data or error per execution; metadata always present.
#[derive(Debug, Clone)]
pub struct StageOutcome<T> {
    result: Result<T, StageError>,
    meta: StageMetadata,
}

impl<T> StageOutcome<T> {
    /// A successful outcome.
    pub fn success(data: T, meta: StageMetadata) -> Self {
        Self {
            result: Ok(data),
            meta,
        }
    }

    /// A failed outcome.
    pub fn failure(error: StageError, meta: StageMetadata) -> Self {
        Self {
            result: Err(error),
            meta,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The success data, when present.
    pub fn data(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// The failure, when present.
    pub fn error(&self) -> Option<&StageError> {
        self.result.as_ref().err()
    }

    /// The invocation metadata; always present.
    pub fn meta(&self) -> &StageMetadata {
        &self.meta
    }

    /// Converts into a plain result, dropping metadata.
    pub fn into_result(self) -> Result<T, StageError> {
        self.result
    }

    /// Splits the outcome into its result and metadata.
    pub fn into_parts(self) -> (Result<T, StageError>, StageMetadata) {
        (self.result, self.meta)
    }
}
