// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Concurrency Limit
//!
//! Validated bound on simultaneous in-flight transforms inside the parallel
//! list adapter and the parallel streaming operators.
//!
//! The limit is a hard invariant: at no time may a bounded-concurrency
//! operator hold more in-flight work than this value. A limit of one must
//! produce results identical to sequential execution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StageError, StageResult};

/// Default limit applied when a list stage enables parallelism without
/// naming one.
const DEFAULT_LIMIT: usize = 10;

/// Validated concurrency limit (`≥ 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConcurrencyLimit(usize);

impl ConcurrencyLimit {
    /// Creates a new concurrency limit.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error when the limit is zero.
    pub fn new(limit: usize) -> StageResult<Self> {
        if limit == 0 {
            return Err(StageError::invalid_config("concurrency limit must be at least 1"));
        }
        Ok(Self(limit))
    }

    /// The raw limit value.
    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for ConcurrencyLimit {
    fn default() -> Self {
        Self(DEFAULT_LIMIT)
    }
}

impl fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert!(ConcurrencyLimit::new(0).is_err());
        assert_eq!(ConcurrencyLimit::new(5).unwrap().get(), 5);
    }

    #[test]
    fn default_is_ten() {
        assert_eq!(ConcurrencyLimit::default().get(), 10);
    }
}
