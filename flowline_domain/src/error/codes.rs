// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Error Code Catalogue
//!
//! Opaque string tags carried by every [`StageError`](super::StageError).
//! The codes are the contract: the retry loop, the list adapter, and the
//! batch/stream adapters all dispatch on them, so their spelling is stable
//! across releases.
//!
//! ## Taxonomy
//!
//! - **Generic**: `STAGE_ERROR` is the default classification for a failure
//!   whose message matched none of the known network tokens.
//! - **Containment**: `UNHANDLED_ERROR` marks a panic that escaped a stage
//!   body; it is never retryable.
//! - **List adapter**: `LIST_STEP_ERROR` (failure inside a custom list
//!   stage body), `LIST_PROCESSING_ERROR` (failure raised by the adapter
//!   itself), and `LIST_PROCESSING_ERRORS` (the COLLECT_ERRORS aggregate,
//!   carrying per-item failures).
//! - **Adapters**: `BATCH_CONVERSION_ERROR` for stream→batch adaptation
//!   failures and `HYBRID_STEP_ERROR` for a hybrid stage's batch path.
//! - **Network-tagged**: `ETIMEDOUT`, `ECONNRESET`, `ECONNREFUSED`, and
//!   `RATE_LIMIT` are lifted from underlying causes and marked retryable.

/// Generic stage failure; retryable only when the message matches the
/// retryable-token set.
pub const STAGE_ERROR: &str = "STAGE_ERROR";

/// A panic escaped the stage body; non-retryable.
pub const UNHANDLED_ERROR: &str = "UNHANDLED_ERROR";

/// A failure inside a custom list stage's execute body; non-retryable.
pub const LIST_STEP_ERROR: &str = "LIST_STEP_ERROR";

/// A failure surfaced by the list adapter itself, not by a single item.
pub const LIST_PROCESSING_ERROR: &str = "LIST_PROCESSING_ERROR";

/// Aggregate returned by the COLLECT_ERRORS strategy; per-item failures
/// travel in the error's item-failure list.
pub const LIST_PROCESSING_ERRORS: &str = "LIST_PROCESSING_ERRORS";

/// Failure during stream→batch adaptation.
pub const BATCH_CONVERSION_ERROR: &str = "BATCH_CONVERSION_ERROR";

/// Failure in a hybrid stage's batch path.
pub const HYBRID_STEP_ERROR: &str = "HYBRID_STEP_ERROR";

/// Invalid construction-time or operator arguments.
pub const INVALID_CONFIGURATION: &str = "INVALID_CONFIGURATION";

/// Network timeout lifted from an underlying cause; retryable.
pub const ETIMEDOUT: &str = "ETIMEDOUT";

/// Connection reset lifted from an underlying cause; retryable.
pub const ECONNRESET: &str = "ECONNRESET";

/// Connection refused lifted from an underlying cause; retryable.
pub const ECONNREFUSED: &str = "ECONNREFUSED";

/// Rate limiting lifted from an underlying cause; retryable.
pub const RATE_LIMIT: &str = "RATE_LIMIT";

/// Network-tagged codes scanned for inside exception messages when
/// classifying an arbitrary failure.
pub const NETWORK_CODES: &[&str] = &[ETIMEDOUT, ECONNRESET, ECONNREFUSED, RATE_LIMIT];
