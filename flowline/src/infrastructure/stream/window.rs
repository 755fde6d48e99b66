// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Windowing
//!
//! Fixed-size windows over a lazy sequence, parameterized by window size
//! and slide size:
//!
//! - **Tumbling** (`slide == window`): non-overlapping windows.
//! - **Sliding** (`slide < window`): after yielding a window, drop `slide`
//!   items from its head and keep filling.
//! - **Hopping** (`slide > window`): after yielding a window, skip
//!   `slide − window` items before starting the next.
//!
//! A final partial window is never emitted in any regime. Invalid sizes
//! surface an invalid-configuration error at the consumer's first pull.
//!
//! ## Usage Examples
//!
//! ```
//! use flowline::stream::{from_vec, to_vec, window};
//!
//! # futures::executor::block_on(async {
//! // Tumbling windows of 2 over [1..5]: the trailing 5 is dropped
//! let windows = window(from_vec(vec![1, 2, 3, 4, 5]), 2, 2);
//! assert_eq!(to_vec(windows).await.unwrap(), vec![vec![1, 2], vec![3, 4]]);
//! # });
//! ```

use async_stream::try_stream;
use futures::TryStreamExt;

use flowline_domain::value_objects::WindowConfig;
use flowline_domain::{ItemStream, WindowRegime};

use super::operators::fail;

/// Windows a sequence with an explicit slide size. Pass
/// `slide_size == window_size` for tumbling windows.
pub fn window<T>(source: ItemStream<T>, window_size: usize, slide_size: usize) -> ItemStream<Vec<T>>
where
    T: Clone + Send + 'static,
{
    let config = match WindowConfig::with_slide(window_size, slide_size) {
        Ok(config) => config,
        Err(error) => return fail(error),
    };
    windowed(source, config)
}

/// Windows a sequence under a pre-validated configuration.
pub fn windowed<T>(source: ItemStream<T>, config: WindowConfig) -> ItemStream<Vec<T>>
where
    T: Clone + Send + 'static,
{
    let window_size = config.window_size();
    let slide_size = config.slide_size();
    Box::pin(try_stream! {
        let mut source = source;
        let mut buffer: Vec<T> = Vec::with_capacity(window_size);
        let mut to_skip = 0usize;
        while let Some(item) = source.try_next().await? {
            if to_skip > 0 {
                to_skip -= 1;
                continue;
            }
            buffer.push(item);
            if buffer.len() == window_size {
                match config.regime() {
                    WindowRegime::Sliding => {
                        yield buffer.clone();
                        buffer.drain(0..slide_size);
                    }
                    WindowRegime::Tumbling => {
                        yield std::mem::replace(&mut buffer, Vec::with_capacity(window_size));
                    }
                    WindowRegime::Hopping => {
                        yield std::mem::replace(&mut buffer, Vec::with_capacity(window_size));
                        to_skip = slide_size - window_size;
                    }
                }
            }
        }
        // A final partial window is dropped, never emitted.
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{from_vec, to_vec};

    #[tokio::test]
    async fn tumbling_drops_the_partial_tail() {
        let windows = window(from_vec((1..=7).collect()), 3, 3);
        assert_eq!(to_vec(windows).await.unwrap(), vec![vec![1, 2, 3], vec![4, 5, 6]]);
    }

    #[tokio::test]
    async fn sliding_overlaps_by_slide() {
        let windows = window(from_vec((1..=5).collect()), 3, 1);
        assert_eq!(
            to_vec(windows).await.unwrap(),
            vec![vec![1, 2, 3], vec![2, 3, 4], vec![3, 4, 5]]
        );
    }

    #[tokio::test]
    async fn sliding_emits_len_minus_window_plus_one() {
        let items: Vec<i64> = (1..=10).collect();
        let windows = window(from_vec(items.clone()), 4, 1);
        assert_eq!(to_vec(windows).await.unwrap().len(), items.len() - 4 + 1);

        let too_short = window(from_vec(vec![1, 2]), 4, 1);
        assert!(to_vec(too_short).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hopping_skips_between_windows() {
        let windows = window(from_vec((1..=10).collect()), 2, 4);
        assert_eq!(to_vec(windows).await.unwrap(), vec![vec![1, 2], vec![5, 6], vec![9, 10]]);
    }

    #[tokio::test]
    async fn size_one_windows_wrap_each_item() {
        let windows = window(from_vec(vec![7, 8]), 1, 1);
        assert_eq!(to_vec(windows).await.unwrap(), vec![vec![7], vec![8]]);
    }

    #[tokio::test]
    async fn invalid_sizes_fail_at_first_pull() {
        let windows = window(from_vec(vec![1]), 0, 1);
        assert!(to_vec(windows).await.is_err());

        let windows = window(from_vec(vec![1]), 2, 0);
        assert!(to_vec(windows).await.is_err());
    }

    #[tokio::test]
    async fn tumbling_concatenation_recovers_the_prefix() {
        let items: Vec<i64> = (1..=11).collect();
        let windows = to_vec(window(from_vec(items.clone()), 4, 4)).await.unwrap();
        let concatenated: Vec<i64> = windows.into_iter().flatten().collect();
        assert_eq!(concatenated, items[..items.len() - items.len() % 4]);
    }
}
