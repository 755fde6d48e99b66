// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Infrastructure
//!
//! The subscribable progress tracker fed by pipeline lifecycle events.

pub mod tracker;

pub use tracker::{OverallProgress, ProgressSubscription, ProgressTracker, StepProgress, StepStatus};
