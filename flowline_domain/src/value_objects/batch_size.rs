// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Batch Size
//!
//! Validated size for fixed-size grouping: the batch stage over collections
//! and the batch operator over streams. A group holds exactly this many
//! items except possibly the final one, which may be short.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StageError, StageResult};

/// Validated batch size (`≥ 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchSize(usize);

impl BatchSize {
    /// Creates a new batch size.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error when the size is zero.
    pub fn new(size: usize) -> StageResult<Self> {
        if size == 0 {
            return Err(StageError::invalid_config("batch size must be at least 1"));
        }
        Ok(Self(size))
    }

    /// The raw size value.
    pub fn get(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BatchSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
