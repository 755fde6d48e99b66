// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stream Runtime
//!
//! The lazy-sequence runtime under both pipeline engines: generator
//! primitives, windowing, time/predicate buffering, the bounded-concurrency
//! parallel executor, and fan-in merging.

pub mod buffer;
pub mod merge;
pub mod operators;
pub mod parallel;
pub mod window;

pub use buffer::{buffer_time, buffer_until};
pub use merge::merge;
pub use operators::{
    batch, empty, fail, filter, flat_map, from_iter, from_vec, map, once, skip, skip_while, take, take_while, tap,
    to_vec,
};
pub use parallel::{parallel_filter, parallel_map, ParallelOptions};
pub use window::{window, windowed};

use flowline_domain::ItemStream;

/// Input coercion for streaming execution: a lazy sequence is used
/// directly, a vector becomes a sequence over its items. Wrap a single
/// value with [`once`].
pub trait IntoItemStream<T: Send + 'static> {
    fn into_item_stream(self) -> ItemStream<T>;
}

impl<T: Send + 'static> IntoItemStream<T> for ItemStream<T> {
    fn into_item_stream(self) -> ItemStream<T> {
        self
    }
}

impl<T: Send + 'static> IntoItemStream<T> for Vec<T> {
    fn into_item_stream(self) -> ItemStream<T> {
        from_vec(self)
    }
}
