// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processing Context
//!
//! The execute-time environment handed to every stage body: the direct
//! output of the previous stage, the accumulated state of every completed
//! stage, and the user-supplied run-scoped record.
//!
//! ## Accumulated State
//!
//! Stage outputs are stored under their stage key as opaque handles and
//! downcast by readers to their declared type. The map grows monotonically:
//! values are inserted exactly once as each stage completes and are never
//! mutated afterwards, so readers receive read-only views. Cloning the
//! state clones the map of handles, not the values; the snapshot handed
//! to each stage is cheap.
//!
//! ## Run Context
//!
//! A run-scoped record built fresh for each execution by the pipeline's
//! context builder (credentials, configuration, clients). Like state
//! values, it is stored as an opaque handle and read back by type.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StageError;
use crate::events::ProgressSink;

/// Opaque handle to a stage output or run-context record.
pub type StateValue = Arc<dyn Any + Send + Sync>;

/// Keyed map of prior stage outputs, visible to all later stages.
#[derive(Clone, Default)]
pub struct AccumulatedState {
    entries: HashMap<String, StateValue>,
}

impl AccumulatedState {
    /// Creates an empty state map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state map from pre-built entries (used by the
    /// batch/stream adapters to project snapshots).
    pub fn from_entries(entries: HashMap<String, StateValue>) -> Self {
        Self { entries }
    }

    /// Inserts a stage output under its key.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error when the key is already
    /// present; state values are inserted exactly once.
    pub fn insert(&mut self, key: impl Into<String>, value: StateValue) -> Result<(), StageError> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(StageError::invalid_config(format!(
                "state key already present: {}",
                key
            )));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Reads a prior stage output by key, downcast to its declared type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.entries.get(key)?.downcast_ref::<T>()
    }

    /// Reads a prior stage output as a shared handle, downcast to its
    /// declared type.
    pub fn get_arc<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        Arc::downcast::<T>(Arc::clone(self.entries.get(key)?)).ok()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys of every completed stage, in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The raw handle map (used by the adapters when projecting state).
    pub fn entries(&self) -> &HashMap<String, StateValue> {
        &self.entries
    }
}

impl std::fmt::Debug for AccumulatedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("AccumulatedState").field("keys", &keys).finish()
    }
}

/// User-supplied run-scoped record, built fresh per execution.
#[derive(Clone, Default)]
pub struct RunContext {
    value: Option<StateValue>,
}

impl RunContext {
    /// An empty context for pipelines with no context builder.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a run-scoped record.
    pub fn of<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Some(Arc::new(value)),
        }
    }

    /// Reads the record back by type.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.as_ref()?.downcast_ref::<T>()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext").field("present", &self.value.is_some()).finish()
    }
}

/// The execute-time environment for a single stage invocation.
#[derive(Clone)]
pub struct StageContext<T> {
    input: T,
    state: AccumulatedState,
    run: RunContext,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl<T> StageContext<T> {
    /// Builds a context from the previous stage's output, the current
    /// accumulated state, and the run context.
    pub fn new(input: T, state: AccumulatedState, run: RunContext) -> Self {
        Self {
            input,
            state,
            run,
            progress: None,
        }
    }

    /// Attaches the progress sink lifecycle events are published to.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The direct output of the previous stage (or the pipeline's initial
    /// input for the first stage).
    pub fn input(&self) -> &T {
        &self.input
    }

    /// Prior stage outputs, keyed by stage key.
    pub fn state(&self) -> &AccumulatedState {
        &self.state
    }

    /// The user-supplied run-scoped record.
    pub fn run(&self) -> &RunContext {
        &self.run
    }

    /// The attached progress sink, when the pipeline carries a tracker.
    pub fn progress(&self) -> Option<&Arc<dyn ProgressSink>> {
        self.progress.as_ref()
    }

    /// Consumes the context, yielding the input value.
    pub fn into_input(self) -> T {
        self.input
    }

    /// Consumes the context, yielding input, state, run context, and
    /// progress sink.
    pub fn into_parts(self) -> (T, AccumulatedState, RunContext, Option<Arc<dyn ProgressSink>>) {
        (self.input, self.state, self.run, self.progress)
    }
}

impl<T> std::fmt::Debug for StageContext<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("state", &self.state)
            .field("run", &self.run)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_values_are_inserted_exactly_once() {
        let mut state = AccumulatedState::new();
        state.insert("parse", Arc::new(vec![1u32, 2, 3]) as StateValue).unwrap();
        assert!(state.insert("parse", Arc::new(0u32) as StateValue).is_err());
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn typed_reads_downcast_to_declared_type() {
        let mut state = AccumulatedState::new();
        state.insert("parse", Arc::new(vec![1u32, 2, 3]) as StateValue).unwrap();
        assert_eq!(state.get::<Vec<u32>>("parse"), Some(&vec![1, 2, 3]));
        assert!(state.get::<String>("parse").is_none());
        assert!(state.get::<Vec<u32>>("missing").is_none());

        let shared = state.get_arc::<Vec<u32>>("parse").unwrap();
        assert_eq!(shared.len(), 3);
    }

    #[test]
    fn run_context_round_trips_by_type() {
        #[derive(Debug, PartialEq)]
        struct Credentials {
            token: String,
        }

        let run = RunContext::of(Credentials {
            token: "secret".to_string(),
        });
        assert_eq!(run.get::<Credentials>().unwrap().token, "secret");
        assert!(run.get::<String>().is_none());
        assert!(RunContext::empty().get::<Credentials>().is_none());
    }
}
