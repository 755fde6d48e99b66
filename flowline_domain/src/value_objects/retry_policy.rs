// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Retry Policy
//!
//! Per-stage retry configuration: a maximum attempt count, a linear backoff
//! base, and an optional whitelist of retryable error codes.
//!
//! ## Semantics
//!
//! A stage is retried only when all three hold: the error is retryable, at
//! least one attempt remains, and either no whitelist exists or the error's
//! code is in it. The sleep between attempt `n` and attempt `n + 1` is
//! `backoff · n` (linear backoff). Exponential backoff with jitter is
//! deliberately not offered here; callers compose it via stage wrappers.
//!
//! ## Usage Examples
//!
//! ```
//! use flowline_domain::value_objects::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(200)).unwrap();
//! assert_eq!(policy.max_attempts(), 3);
//! assert_eq!(policy.backoff_for(2), Duration::from_millis(400));
//!
//! // Zero attempts are rejected at construction
//! assert!(RetryPolicy::new(0, Duration::from_millis(200)).is_err());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StageError, StageResult};

/// Default backoff base when a stage declares no policy.
const DEFAULT_BACKOFF_MS: u64 = 1_000;

/// Retry policy value object.
///
/// Immutable once constructed; `max_attempts ≥ 1` is enforced at
/// construction. The default policy is a single attempt with a one-second
/// backoff base, matching a stage that declared nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_ms: u64,
    retryable_error_codes: Option<Vec<String>>,
}

impl RetryPolicy {
    /// Creates a new retry policy.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error when `max_attempts` is zero.
    pub fn new(max_attempts: u32, backoff: Duration) -> StageResult<Self> {
        if max_attempts == 0 {
            return Err(StageError::invalid_config("retry max_attempts must be at least 1"));
        }
        Ok(Self {
            max_attempts,
            backoff_ms: backoff.as_millis() as u64,
            retryable_error_codes: None,
        })
    }

    /// Restricts retries to errors whose code appears in the whitelist.
    pub fn with_retryable_codes(mut self, retryable_codes: Vec<String>) -> Self {
        self.retryable_error_codes = Some(retryable_codes);
        self
    }

    /// Maximum number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff base duration.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Backoff base in milliseconds.
    pub fn backoff_ms(&self) -> u64 {
        self.backoff_ms
    }

    /// The retryable-code whitelist, when one was declared.
    pub fn retryable_error_codes(&self) -> Option<&[String]> {
        self.retryable_error_codes.as_deref()
    }

    /// Linear backoff for the given completed attempt number (1-based):
    /// `backoff · attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }

    /// Whether the whitelist (if any) admits the given error code.
    pub fn allows_code(&self, code: &str) -> bool {
        match &self.retryable_error_codes {
            Some(allowed) => allowed.iter().any(|c| c == code),
            None => true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: DEFAULT_BACKOFF_MS,
            retryable_error_codes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.backoff_ms(), 1_000);
        assert!(policy.allows_code("ANYTHING"));
    }

    #[test]
    fn backoff_scales_linearly() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100)).unwrap();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(300));
    }

    #[test]
    fn whitelist_gates_codes() {
        let policy = RetryPolicy::new(2, Duration::from_millis(50))
            .unwrap()
            .with_retryable_codes(vec!["ETIMEDOUT".to_string()]);
        assert!(policy.allows_code("ETIMEDOUT"));
        assert!(!policy.allows_code("ECONNRESET"));
    }
}
