// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fan-In Merge
//!
//! Single-pull-per-source fan-in over any number of lazy sequences: items
//! are emitted as they arrive from any source, per-source order is
//! preserved, and the merged sequence completes when every source is
//! exhausted. The first source error terminates the merge; the remaining
//! sources are closed by dropping them.

use async_stream::try_stream;
use futures::TryStreamExt;

use flowline_domain::ItemStream;

/// Merges the given sequences into one.
pub fn merge<T: Send + 'static>(sources: Vec<ItemStream<T>>) -> ItemStream<T> {
    Box::pin(try_stream! {
        let mut merged = futures::stream::select_all(sources);
        while let Some(item) = merged.try_next().await? {
            yield item;
        }
    })
}
