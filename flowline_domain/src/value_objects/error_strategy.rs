// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Error Strategy
//!
//! Failure-handling policy applied by the list adapter when a per-item
//! transform fails part-way through a collection.

use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// How the list adapter treats per-item failures.
///
/// # Examples
///
/// ```
/// use flowline_domain::value_objects::ErrorStrategy;
/// use std::str::FromStr;
///
/// assert_eq!(ErrorStrategy::from_str("collect_errors").unwrap(), ErrorStrategy::CollectErrors);
/// assert_eq!(format!("{}", ErrorStrategy::SkipFailed), "skip_failed");
/// assert_eq!(ErrorStrategy::default(), ErrorStrategy::FailFast);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorStrategy {
    /// Stop at the first failure and return it.
    #[default]
    FailFast,
    /// Process every item, then return an aggregate error if any failed.
    CollectErrors,
    /// Process every item and return the successes, dropping failures.
    SkipFailed,
}

impl std::fmt::Display for ErrorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorStrategy::FailFast => write!(f, "fail_fast"),
            ErrorStrategy::CollectErrors => write!(f, "collect_errors"),
            ErrorStrategy::SkipFailed => write!(f, "skip_failed"),
        }
    }
}

impl std::str::FromStr for ErrorStrategy {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail_fast" => Ok(ErrorStrategy::FailFast),
            "collect_errors" => Ok(ErrorStrategy::CollectErrors),
            "skip_failed" => Ok(ErrorStrategy::SkipFailed),
            _ => Err(StageError::invalid_config(format!("Unknown error strategy: {}", s))),
        }
    }
}
