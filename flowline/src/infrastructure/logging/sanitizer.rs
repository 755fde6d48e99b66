// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Payload Sanitizer
//!
//! Truncation of verbose payloads before they reach debug logs. The
//! sanitizer walks a `serde_json::Value` and applies these contracts:
//!
//! - Strings longer than the string threshold are truncated with an
//!   ellipsis and a total-length annotation.
//! - Arrays longer than the array threshold are replaced with an
//!   `__arrayInfo__` record carrying the length and the first elements,
//!   each recursively sanitized.
//! - Numeric arrays whose length is a known embedding dimension (384,
//!   512, 768, 1024, 1536, 3072) or exceeds 100 are rendered as an
//!   `[Embedding: dim=N, sample=[…]]` string with three-decimal values.
//! - Objects nested beyond the depth threshold are replaced with their
//!   key list and a max-depth marker.
//! - Keys in the preserve set are never truncated; keys in the truncate
//!   set are always truncated, even below the thresholds.
//!
//! Thresholds are read once at process start from
//! `FLOWLINE_MAX_ARRAY_ITEMS`, `FLOWLINE_MAX_STRING_LENGTH`, and
//! `FLOWLINE_MAX_DEPTH`, each falling back to its default when absent or
//! unparseable.

use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};

use flowline_domain::StageError;

/// Keys whose string values are never truncated.
const PRESERVE_KEYS: &[&str] = &["id", "score", "event", "component", "traceId", "spanId", "trace_id", "span_id"];

/// Keys whose values are always truncated, even below the thresholds.
const TRUNCATE_KEYS: &[&str] = &[
    "embedding",
    "vector",
    "payload",
    "results",
    "rawResponse",
    "fullParams",
    "raw_response",
    "full_params",
];

/// Recognized embedding dimensions.
const EMBEDDING_DIMS: &[usize] = &[384, 512, 768, 1024, 1536, 3072];

/// Numeric arrays longer than this are treated as embeddings regardless
/// of dimension.
const EMBEDDING_LENGTH_FLOOR: usize = 100;

/// String preview length applied under truncate-set keys.
const FORCED_STRING_PREVIEW: usize = 50;

/// Sanitizer thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizerConfig {
    pub max_string_length: usize,
    pub max_array_length: usize,
    pub max_depth: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_string_length: 500,
            max_array_length: 3,
            max_depth: 3,
        }
    }
}

impl SanitizerConfig {
    /// Reads the threshold triple from the environment, falling back to
    /// the defaults field-by-field.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_string_length: read_env("FLOWLINE_MAX_STRING_LENGTH", defaults.max_string_length),
            max_array_length: read_env("FLOWLINE_MAX_ARRAY_ITEMS", defaults.max_array_length),
            max_depth: read_env("FLOWLINE_MAX_DEPTH", defaults.max_depth),
        }
    }
}

fn read_env(name: &str, fallback: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(fallback)
}

/// Process-wide configuration, read once at first use.
static PROCESS_CONFIG: Lazy<SanitizerConfig> = Lazy::new(SanitizerConfig::from_env);

/// Sanitizes a payload under the process-wide thresholds.
pub fn sanitize(value: &Value) -> Value {
    sanitize_with(value, &PROCESS_CONFIG)
}

/// Sanitizes a payload under explicit thresholds.
pub fn sanitize_with(value: &Value, config: &SanitizerConfig) -> Value {
    walk(value, config, 0, None)
}

/// Renders a stage error for logging.
pub fn sanitize_error(error: &StageError) -> Value {
    json!({
        "name": "StageError",
        "code": error.code(),
        "message": error.message(),
        "retryable": error.retryable(),
    })
}

/// Sanitizes and renders a payload as a single-line JSON string for
/// debug-level log fields.
pub fn debug_payload(value: &Value) -> String {
    sanitize(value).to_string()
}

fn walk(value: &Value, config: &SanitizerConfig, depth: usize, key: Option<&str>) -> Value {
    let forced = key.is_some_and(|key| TRUNCATE_KEYS.contains(&key));
    let preserved = key.is_some_and(|key| PRESERVE_KEYS.contains(&key));
    match value {
        Value::String(text) => {
            if preserved {
                return value.clone();
            }
            let limit = if forced {
                FORCED_STRING_PREVIEW.min(config.max_string_length)
            } else {
                config.max_string_length
            };
            truncate_string(text, limit)
        }
        Value::Array(items) => {
            if let Some(rendered) = render_embedding(items) {
                return rendered;
            }
            if items.len() > config.max_array_length || forced {
                let showing = items.len().min(config.max_array_length);
                let sample: Vec<Value> = items
                    .iter()
                    .take(showing)
                    .map(|item| walk(item, config, depth + 1, None))
                    .collect();
                json!({
                    "__arrayInfo__": {
                        "length": items.len(),
                        "showing": showing,
                        "items": sample,
                    }
                })
            } else {
                Value::Array(items.iter().map(|item| walk(item, config, depth + 1, None)).collect())
            }
        }
        Value::Object(fields) => {
            if depth >= config.max_depth {
                let keys: Vec<Value> = fields.keys().map(|key| Value::String(key.clone())).collect();
                return json!({
                    "__keys__": keys,
                    "__depth__": "max depth exceeded",
                });
            }
            let mut sanitized = Map::with_capacity(fields.len());
            for (field_key, field_value) in fields {
                sanitized.insert(
                    field_key.clone(),
                    walk(field_value, config, depth + 1, Some(field_key.as_str())),
                );
            }
            Value::Object(sanitized)
        }
        _ => value.clone(),
    }
}

fn truncate_string(text: &str, limit: usize) -> Value {
    let total = text.chars().count();
    if total <= limit {
        return Value::String(text.to_string());
    }
    let preview: String = text.chars().take(limit).collect();
    Value::String(format!("{}... [length: {}]", preview, total))
}

/// Detects an embedding-shaped numeric array and renders its summary.
fn render_embedding(items: &[Value]) -> Option<Value> {
    if items.is_empty() || !items.iter().all(Value::is_number) {
        return None;
    }
    let dim = items.len();
    if !EMBEDDING_DIMS.contains(&dim) && dim <= EMBEDDING_LENGTH_FLOOR {
        return None;
    }
    let sample: Vec<String> = items
        .iter()
        .take(3)
        .map(|item| format!("{:.3}", item.as_f64().unwrap_or(0.0)))
        .collect();
    Some(Value::String(format!(
        "[Embedding: dim={}, sample=[{}, ...]]",
        dim,
        sample.join(", ")
    )))
}
