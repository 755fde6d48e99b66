// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Category
//!
//! Coarse classification of what a stage does, used by the batch/stream
//! adapters to recommend an execution mode. A stage may declare its category
//! explicitly; otherwise the adapters fall back to name-based heuristics.

use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// The primary behavior of a stage.
///
/// # Examples
///
/// ```
/// use flowline_domain::value_objects::StageCategory;
/// use std::str::FromStr;
///
/// assert_eq!(StageCategory::from_str("io_bound").unwrap(), StageCategory::IoBound);
/// assert_eq!(format!("{}", StageCategory::Aggregation), "aggregation");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StageCategory {
    /// One-to-one, side-effect-free transformation.
    #[default]
    PureTransform,
    /// Dominated by network, disk, or database waits.
    IoBound,
    /// Needs the whole collection at once (sort, group, statistics).
    Aggregation,
    /// Emits more items than it consumes.
    Expansion,
    /// Emits fewer items than it consumes.
    Reduction,
    /// Carries state across items.
    Stateful,
}

impl std::fmt::Display for StageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageCategory::PureTransform => write!(f, "pure_transform"),
            StageCategory::IoBound => write!(f, "io_bound"),
            StageCategory::Aggregation => write!(f, "aggregation"),
            StageCategory::Expansion => write!(f, "expansion"),
            StageCategory::Reduction => write!(f, "reduction"),
            StageCategory::Stateful => write!(f, "stateful"),
        }
    }
}

impl std::str::FromStr for StageCategory {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pure_transform" => Ok(StageCategory::PureTransform),
            "io_bound" => Ok(StageCategory::IoBound),
            "aggregation" => Ok(StageCategory::Aggregation),
            "expansion" => Ok(StageCategory::Expansion),
            "reduction" => Ok(StageCategory::Reduction),
            "stateful" => Ok(StageCategory::Stateful),
            _ => Err(StageError::invalid_config(format!("Unknown stage category: {}", s))),
        }
    }
}
