// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Window Configuration
//!
//! A fixed-size view onto a sequence, parameterized by a window size and a
//! slide size. The relationship between the two selects the regime:
//!
//! - `slide == window`: **tumbling**: non-overlapping windows
//! - `slide < window`: **sliding**: overlapping windows, advancing by
//!   `slide` items
//! - `slide > window`: **hopping**: gaps of `slide − window` items between
//!   windows
//!
//! Partial windows are never emitted in any regime.
//!
//! ## Usage Examples
//!
//! ```
//! use flowline_domain::value_objects::{WindowConfig, WindowRegime};
//!
//! let tumbling = WindowConfig::new(4).unwrap();
//! assert_eq!(tumbling.regime(), WindowRegime::Tumbling);
//!
//! let sliding = WindowConfig::with_slide(4, 1).unwrap();
//! assert_eq!(sliding.regime(), WindowRegime::Sliding);
//!
//! let hopping = WindowConfig::with_slide(2, 5).unwrap();
//! assert_eq!(hopping.regime(), WindowRegime::Hopping);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StageError, StageResult};

/// The overlap regime selected by the window/slide relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowRegime {
    /// Non-overlapping windows; `slide == window`.
    Tumbling,
    /// Overlapping windows; `slide < window`.
    Sliding,
    /// Windows separated by skipped items; `slide > window`.
    Hopping,
}

impl fmt::Display for WindowRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowRegime::Tumbling => write!(f, "tumbling"),
            WindowRegime::Sliding => write!(f, "sliding"),
            WindowRegime::Hopping => write!(f, "hopping"),
        }
    }
}

/// Validated window configuration. Both sizes must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    window_size: usize,
    slide_size: usize,
}

impl WindowConfig {
    /// Creates a tumbling window configuration (`slide == window`).
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error when the size is zero.
    pub fn new(window_size: usize) -> StageResult<Self> {
        Self::with_slide(window_size, window_size)
    }

    /// Creates a window configuration with an explicit slide.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error when either size is zero.
    pub fn with_slide(window_size: usize, slide_size: usize) -> StageResult<Self> {
        if window_size == 0 {
            return Err(StageError::invalid_config("window size must be positive"));
        }
        if slide_size == 0 {
            return Err(StageError::invalid_config("window slide size must be positive"));
        }
        Ok(Self {
            window_size,
            slide_size,
        })
    }

    /// Number of items per emitted window.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of items the window advances by between emissions.
    pub fn slide_size(&self) -> usize {
        self.slide_size
    }

    /// The overlap regime selected by this configuration.
    pub fn regime(&self) -> WindowRegime {
        use std::cmp::Ordering;
        match self.slide_size.cmp(&self.window_size) {
            Ordering::Equal => WindowRegime::Tumbling,
            Ordering::Less => WindowRegime::Sliding,
            Ordering::Greater => WindowRegime::Hopping,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(WindowConfig::new(0).is_err());
        assert!(WindowConfig::with_slide(3, 0).is_err());
        assert!(WindowConfig::with_slide(0, 3).is_err());
    }

    #[test]
    fn regime_follows_slide_relationship() {
        assert_eq!(WindowConfig::new(3).unwrap().regime(), WindowRegime::Tumbling);
        assert_eq!(WindowConfig::with_slide(3, 1).unwrap().regime(), WindowRegime::Sliding);
        assert_eq!(WindowConfig::with_slide(2, 4).unwrap().regime(), WindowRegime::Hopping);
    }
}
