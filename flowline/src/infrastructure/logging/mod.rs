// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging Infrastructure
//!
//! Structured lifecycle logging for both engines, built on `tracing`.
//!
//! ## Levels
//!
//! Six named levels with fixed numeric severities (trace 10, debug 20,
//! info 30, warn 40, error 50, fatal 60) plus `silent`, which suppresses
//! everything. A minimum-level threshold is applied before emission.
//! `tracing` has no sixth level of its own, so `fatal` emits at error
//! severity; the numeric ladder is preserved for configuration and
//! comparison.
//!
//! ## Formats
//!
//! Three line formats, selected by configuration and affecting operator
//! telemetry only, never pipeline behavior:
//!
//! - **compact**: single-line with targets and timestamps
//! - **hybrid**: multi-line pretty output for interactive debugging
//! - **minimal**: single-line without timestamps or targets
//!
//! ## Environment
//!
//! `LoggingConfig::from_env` reads `FLOWLINE_LOG_LEVEL` and
//! `FLOWLINE_LOG_FORMAT`, falling back to `info`/`compact` when a
//! variable is absent or unparseable.

pub mod sanitizer;

pub use sanitizer::{debug_payload, sanitize, sanitize_error, sanitize_with, SanitizerConfig};

use flowline_domain::{StageError, StageResult};
use tracing_subscriber::filter::LevelFilter;

/// Named log level with a fixed numeric severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Silent,
}

impl LogLevel {
    /// The numeric severity: 10 through 60, with `silent` above any
    /// emittable level.
    pub fn severity(&self) -> u32 {
        match self {
            LogLevel::Trace => 10,
            LogLevel::Debug => 20,
            LogLevel::Info => 30,
            LogLevel::Warn => 40,
            LogLevel::Error => 50,
            LogLevel::Fatal => 60,
            LogLevel::Silent => u32::MAX,
        }
    }

    /// The `tracing` filter this level maps onto.
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Fatal => LevelFilter::ERROR,
            LogLevel::Silent => LevelFilter::OFF,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Fatal => write!(f, "fatal"),
            LogLevel::Silent => write!(f, "silent"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = StageError;

    fn from_str(s: &str) -> StageResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            "silent" => Ok(LogLevel::Silent),
            _ => Err(StageError::invalid_config(format!("Unknown log level: {}", s))),
        }
    }
}

/// Log line format; telemetry only, never pipeline behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Hybrid,
    Minimal,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Hybrid => write!(f, "hybrid"),
            LogFormat::Minimal => write!(f, "minimal"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = StageError;

    fn from_str(s: &str) -> StageResult<Self> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "hybrid" => Ok(LogFormat::Hybrid),
            "minimal" => Ok(LogFormat::Minimal),
            _ => Err(StageError::invalid_config(format!("Unknown log format: {}", s))),
        }
    }
}

/// Subscriber configuration resolved from the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Reads `FLOWLINE_LOG_LEVEL` and `FLOWLINE_LOG_FORMAT`, falling back
    /// to the defaults on absent or unparseable values.
    pub fn from_env() -> Self {
        let level = std::env::var("FLOWLINE_LOG_LEVEL")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        let format = std::env::var("FLOWLINE_LOG_FORMAT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        Self { level, format }
    }
}

/// Installs the global `tracing` subscriber for the configured level and
/// format. Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    let filter = config.level.level_filter();
    let result = match config.format {
        LogFormat::Compact => tracing_subscriber::fmt().with_max_level(filter).compact().try_init(),
        LogFormat::Hybrid => tracing_subscriber::fmt().with_max_level(filter).pretty().try_init(),
        LogFormat::Minimal => tracing_subscriber::fmt()
            .with_max_level(filter)
            .without_time()
            .with_target(false)
            .compact()
            .try_init(),
    };
    // A subscriber installed by the host application wins
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn severities_follow_the_ladder() {
        assert_eq!(LogLevel::Trace.severity(), 10);
        assert_eq!(LogLevel::Fatal.severity(), 60);
        assert!(LogLevel::Silent.severity() > LogLevel::Fatal.severity());
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(LogLevel::from_str("WARN").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("fatal").unwrap(), LogLevel::Fatal);
        assert!(LogLevel::from_str("loud").is_err());
    }

    #[test]
    fn fatal_emits_at_error_severity() {
        assert_eq!(LogLevel::Fatal.level_filter(), LevelFilter::ERROR);
        assert_eq!(LogLevel::Silent.level_filter(), LevelFilter::OFF);
    }

    #[test]
    fn formats_round_trip() {
        for format in [LogFormat::Compact, LogFormat::Hybrid, LogFormat::Minimal] {
            assert_eq!(LogFormat::from_str(&format.to_string()).unwrap(), format);
        }
    }
}
