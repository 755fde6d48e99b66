// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Error
//!
//! The single error type flowing through the pipeline domain. Every stage
//! body, list strategy, streaming operator, and adapter reports failure as a
//! [`StageError`]: a coded, message-bearing, optionally cause-wrapping value
//! that knows whether a retry could plausibly succeed.
//!
//! ## Overview
//!
//! The error type is designed around three consumers:
//!
//! - **The retry loop**: dispatches on `retryable` and on the error code
//!   against a stage's retryable-code whitelist.
//! - **The list adapter**: aggregates per-item failures into a single
//!   `LIST_PROCESSING_ERRORS` error whose ordered item-failure list carries
//!   every constituent.
//! - **Structured logging**: the code, message, and retryability are emitted
//!   verbatim on `stage_failed` events.
//!
//! ## Classification Heuristics
//!
//! When an error is built from an arbitrary failure message, the code is
//! derived by scanning for a fixed set of network tokens (`ETIMEDOUT`,
//! `ECONNRESET`, `ECONNREFUSED`, `RATE_LIMIT`), defaulting to `STAGE_ERROR`.
//! Retryability is derived from the same tokens plus the substrings
//! `fetch failed` and `rate limit`, case-insensitively. These heuristics are
//! a contract: they are observable by the retry loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::codes;

/// A single per-item failure inside a COLLECT_ERRORS aggregate.
///
/// The `index` is the item's position in the original input collection; the
/// list adapter keeps item failures ordered by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub index: usize,
    pub error: StageError,
}

impl ItemFailure {
    /// Creates a new item failure at the given input index.
    pub fn new(index: usize, error: StageError) -> Self {
        Self { index, error }
    }
}

/// Domain error for the pipeline processing system.
///
/// Carries an opaque `code` tag (see [`codes`]), a human-readable message,
/// a retryability flag, an optional wrapped cause, and an ordered list of
/// per-item failures when the error aggregates a collection run.
///
/// ## Design Principles
///
/// - **Coded**: the code is the machine-readable contract; the message is
///   for humans
/// - **Retry-aware**: `retryable` is derived once at construction and then
///   observed, never recomputed
/// - **Cloneable**: errors can be cloned into metadata and logs without cost
///   concerns
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct StageError {
    code: String,
    message: String,
    retryable: bool,
    cause: Option<Box<StageError>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    item_failures: Vec<ItemFailure>,
}

impl StageError {
    /// Creates a new error with an explicit code. Retryability defaults to
    /// whether the code is one of the network-tagged codes.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let retryable = codes::NETWORK_CODES.contains(&code.as_str());
        Self {
            code,
            message: message.into(),
            retryable,
            cause: None,
            item_failures: Vec::new(),
        }
    }

    /// Builds an error from an arbitrary failure message, deriving the code
    /// and retryability via the classification heuristics.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let code = Self::classify_code(&message);
        let retryable = Self::is_retryable_message(&message);
        Self {
            code: code.to_string(),
            message,
            retryable,
            cause: None,
            item_failures: Vec::new(),
        }
    }

    /// Builds an error from an underlying failure, classifying from its
    /// rendered message and wrapping it as the cause.
    pub fn from_cause(cause: &(dyn std::error::Error + 'static)) -> Self {
        Self::from_message(cause.to_string())
    }

    /// Creates a new invalid-configuration error; non-retryable.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_CONFIGURATION, message)
    }

    /// Creates a new unhandled error (a panic escaped a stage body);
    /// non-retryable.
    pub fn unhandled(message: impl Into<String>) -> Self {
        Self::new(codes::UNHANDLED_ERROR, message)
    }

    /// Creates a new list-step error; non-retryable.
    pub fn list_step(message: impl Into<String>) -> Self {
        Self::new(codes::LIST_STEP_ERROR, message)
    }

    /// Creates a new list-processing error (raised by the adapter itself).
    pub fn list_processing(message: impl Into<String>) -> Self {
        Self::new(codes::LIST_PROCESSING_ERROR, message)
    }

    /// Creates a new batch-conversion error.
    pub fn batch_conversion(message: impl Into<String>) -> Self {
        Self::new(codes::BATCH_CONVERSION_ERROR, message)
    }

    /// Creates a new hybrid-step error.
    pub fn hybrid_step(message: impl Into<String>) -> Self {
        Self::new(codes::HYBRID_STEP_ERROR, message)
    }

    /// Overrides the retryability flag.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Wraps an underlying failure as this error's cause.
    pub fn with_cause(mut self, cause: StageError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Attaches the ordered per-item failures of an aggregate error.
    pub fn with_item_failures(mut self, failures: Vec<ItemFailure>) -> Self {
        self.item_failures = failures;
        self
    }

    /// The opaque code tag.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether a retry could plausibly succeed.
    pub fn retryable(&self) -> bool {
        self.retryable
    }

    /// The wrapped underlying failure, when present.
    pub fn cause(&self) -> Option<&StageError> {
        self.cause.as_deref()
    }

    /// Ordered per-item failures of an aggregate error; empty otherwise.
    pub fn item_failures(&self) -> &[ItemFailure] {
        &self.item_failures
    }

    /// Gets the error category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self.code.as_str() {
            codes::INVALID_CONFIGURATION => "configuration",
            codes::UNHANDLED_ERROR => "internal",
            codes::LIST_STEP_ERROR | codes::LIST_PROCESSING_ERROR | codes::LIST_PROCESSING_ERRORS => "list",
            codes::BATCH_CONVERSION_ERROR | codes::HYBRID_STEP_ERROR => "adapter",
            code if codes::NETWORK_CODES.contains(&code) => "network",
            _ => "stage",
        }
    }

    /// Derives a code from a failure message by scanning for the known
    /// network tokens; defaults to `STAGE_ERROR`.
    pub fn classify_code(message: &str) -> &'static str {
        for code in codes::NETWORK_CODES {
            if message.contains(code) {
                return code;
            }
        }
        codes::STAGE_ERROR
    }

    /// Derives retryability from a failure message: the network tokens plus
    /// the substrings `fetch failed` and `rate limit`, case-insensitively.
    pub fn is_retryable_message(message: &str) -> bool {
        if codes::NETWORK_CODES.iter().any(|code| message.contains(code)) {
            return true;
        }
        let lower = message.to_lowercase();
        lower.contains("fetch failed") || lower.contains("rate limit")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_derives_network_codes() {
        let err = StageError::from_message("connect ETIMEDOUT 10.0.0.1:443");
        assert_eq!(err.code(), codes::ETIMEDOUT);
        assert!(err.retryable());

        let err = StageError::from_message("socket hang up: ECONNRESET");
        assert_eq!(err.code(), codes::ECONNRESET);
        assert!(err.retryable());
    }

    #[test]
    fn classification_defaults_to_stage_error() {
        let err = StageError::from_message("parse failure at line 3");
        assert_eq!(err.code(), codes::STAGE_ERROR);
        assert!(!err.retryable());
    }

    #[test]
    fn retryable_substrings_are_case_insensitive() {
        assert!(StageError::from_message("Fetch Failed after 3 tries").retryable());
        assert!(StageError::from_message("429: Rate Limit exceeded").retryable());
        assert!(!StageError::from_message("missing field `name`").retryable());
    }

    #[test]
    fn unhandled_errors_are_not_retryable() {
        let err = StageError::unhandled("index out of bounds");
        assert_eq!(err.code(), codes::UNHANDLED_ERROR);
        assert!(!err.retryable());
        assert_eq!(err.category(), "internal");
    }

    #[test]
    fn aggregate_carries_ordered_item_failures() {
        let err = StageError::new(codes::LIST_PROCESSING_ERRORS, "2 of 5 items failed").with_item_failures(vec![
            ItemFailure::new(1, StageError::from_message("boom")),
            ItemFailure::new(3, StageError::from_message("boom")),
        ]);
        let indices: Vec<usize> = err.item_failures().iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = StageError::invalid_config("window size must be positive");
        assert_eq!(err.to_string(), "[INVALID_CONFIGURATION] window size must be positive");
    }
}
