// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Layer
//!
//! The pipeline engines and their stage constructors: the batch pipeline
//! over collections, the streaming pipeline over lazy sequences, the list
//! adapter lifting single-item transforms, and the projections between
//! the two pipeline kinds.

pub mod adapters;
pub mod list_stage;
pub mod pipeline;
pub mod streaming;

pub use adapters::{
    categorize, categorize_stage, categorize_streaming_stage, hybrid, recommend, to_batch, to_streaming, BatchedStage,
    HybridStage, StreamedStage, StreamingRecommendation,
};
pub use list_stage::{
    BatchStage, FilterStage, FlatMapStage, FlattenStage, ListItemContext, ListOptions, ListStage,
};
pub use pipeline::{BranchStage, Pipeline};
pub use streaming::StreamingPipeline;
