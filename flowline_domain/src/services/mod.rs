// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain services for the Flowline domain.
//!
//! Stateless seams the engines are built against: the batch stage trait,
//! the streaming stage trait, and the RFC3339 datetime serde helper.

pub mod datetime_serde;
pub mod stage_service;
pub mod streaming_stage;

pub use stage_service::{FnStage, Stage};
pub use streaming_stage::{FnStreamingStage, ItemStream, StreamContext, StreamingStage};
