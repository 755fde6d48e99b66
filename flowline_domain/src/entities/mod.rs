// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Entities for the Flowline domain.
//!
//! Execution-scoped objects with identity through time: stage metadata and
//! outcomes, the execute-time context, and the streaming state with its
//! snapshot and stream views.

pub mod processing_context;
pub mod stage_metadata;
pub mod stage_outcome;
pub mod streaming_state;

pub use processing_context::{AccumulatedState, RunContext, StageContext, StateValue};
pub use stage_metadata::{ExecutionStrategy, ItemTimings, ListOperationMetadata, StageMetadata};
pub use stage_outcome::{StageOutcome, StageReport};
pub use streaming_state::{SharedBuffer, StreamingState};
