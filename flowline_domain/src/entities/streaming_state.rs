// /////////////////////////////////////////////////////////////////////////////
// Flowline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Streaming State
//!
//! Two overlapping views onto prior-stage outputs during a streaming
//! execution:
//!
//! - **Snapshot view**: a fully materialized array per stage key, present
//!   only for stages the pipeline explicitly checkpointed.
//! - **Stream view**: a consume-once lazy sequence for stages the pipeline
//!   retained; items land in a side buffer as they flow downstream and are
//!   yielded to at most one reader, after which materialization to a cached
//!   snapshot is still permitted.
//!
//! Once a retained stream is materialized it becomes a snapshot; the two
//! views never diverge. Checkpointing is always explicit; nothing is
//! materialized behind the pipeline's back.
//!
//! In batch mode (a streaming stage projected into a batch pipeline), only
//! the snapshot view exists; stream accessors report
//! `Stream access not supported in batch mode`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use crate::entities::processing_context::{AccumulatedState, StateValue};
use crate::error::{StageError, StageResult};
use crate::services::streaming_stage::ItemStream;

/// Side buffer carrying a retained stage's items to at most one reader.
///
/// Producers push erased item handles as items flow downstream and close
/// the buffer when the stage's stream ends (on every exit path, including
/// consumer abort). The single reader drains in arrival order.
pub struct SharedBuffer {
    queue: Mutex<VecDeque<StateValue>>,
    closed: AtomicBool,
    claimed: AtomicBool,
    notify: Notify,
}

impl SharedBuffer {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Appends one item handle.
    pub fn push(&self, value: StateValue) {
        self.queue.lock().push_back(value);
        self.notify.notify_one();
    }

    /// Marks the buffer complete; idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Claims single-reader access; the second claim fails.
    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    /// Pops the next item, waiting for the producer when the buffer is
    /// open and empty. Returns `None` once drained and closed.
    pub async fn next(&self) -> Option<StateValue> {
        loop {
            let notified = self.notify.notified();
            if let Some(value) = self.queue.lock().pop_front() {
                return Some(value);
            }
            if self.closed.load(Ordering::Acquire) {
                return self.queue.lock().pop_front();
            }
            notified.await;
        }
    }
}

/// Snapshot and stream views onto prior streaming-stage outputs.
pub struct StreamingState {
    batch_mode: bool,
    snapshots: RwLock<HashMap<String, StateValue>>,
    buffers: RwLock<HashMap<String, Arc<SharedBuffer>>>,
}

impl StreamingState {
    /// Fresh state for one streaming execution.
    pub fn new() -> Self {
        Self {
            batch_mode: false,
            snapshots: RwLock::new(HashMap::new()),
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// State for a streaming stage projected into a batch pipeline: the
    /// batch pipeline's accumulated state becomes the snapshot view and
    /// stream access is unsupported.
    pub fn batch_mode(accumulated: &AccumulatedState) -> Self {
        Self {
            batch_mode: true,
            snapshots: RwLock::new(accumulated.entries().clone()),
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Stores a checkpointed stage's materialized output.
    ///
    /// # Errors
    ///
    /// Returns an invalid-configuration error when the key already holds a
    /// snapshot; snapshots are inserted exactly once.
    pub fn insert_snapshot<T: Send + Sync + 'static>(&self, key: &str, items: Vec<T>) -> StageResult<()> {
        let mut snapshots = self.snapshots.write();
        if snapshots.contains_key(key) {
            return Err(StageError::invalid_config(format!(
                "snapshot already present for key: {}",
                key
            )));
        }
        snapshots.insert(key.to_string(), Arc::new(items) as StateValue);
        Ok(())
    }

    /// Reads a checkpointed snapshot. Returns `None` for keys that were
    /// never checkpointed or materialized.
    pub fn accumulated<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let snapshots = self.snapshots.read();
        Arc::downcast::<T>(Arc::clone(snapshots.get(key)?)).ok()
    }

    /// Projects every snapshot into an accumulated-state view for
    /// per-item batch stage invocations.
    pub fn accumulated_view(&self) -> AccumulatedState {
        AccumulatedState::from_entries(self.snapshots.read().clone())
    }

    /// Registers the side buffer a retained stage tees into. Reuses the
    /// existing buffer when the key was already registered.
    pub fn register_buffer(&self, key: &str) -> Arc<SharedBuffer> {
        let mut buffers = self.buffers.write();
        Arc::clone(buffers.entry(key.to_string()).or_insert_with(|| Arc::new(SharedBuffer::new())))
    }

    /// Opens the stream view for a stage key: from the snapshot when one
    /// exists, otherwise from the retained side buffer (consume-once).
    ///
    /// # Errors
    ///
    /// In batch mode stream access is unsupported; a retained stream that
    /// was already consumed cannot be reopened.
    pub fn stream<T>(&self, key: &str) -> StageResult<Option<ItemStream<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        if self.batch_mode {
            return Err(StageError::invalid_config("Stream access not supported in batch mode"));
        }
        if let Some(snapshot) = self.accumulated::<Vec<T>>(key) {
            let items: Vec<StageResult<T>> = snapshot.iter().cloned().map(Ok).collect();
            return Ok(Some(Box::pin(futures::stream::iter(items))));
        }
        let buffer = {
            let buffers = self.buffers.read();
            match buffers.get(key) {
                Some(buffer) => Arc::clone(buffer),
                None => return Ok(None),
            }
        };
        if !buffer.claim() {
            return Err(StageError::invalid_config(format!(
                "stream for key {} was already consumed",
                key
            )));
        }
        let stream = futures::stream::unfold(buffer, |buffer| async move {
            let value = buffer.next().await?;
            let item = match Arc::downcast::<T>(value) {
                Ok(item) => Ok((*item).clone()),
                Err(_) => Err(StageError::unhandled("retained stream item type mismatch")),
            };
            Some((item, buffer))
        });
        Ok(Some(Box::pin(stream)))
    }

    /// Converts a retained lazy sequence into a cached snapshot, draining
    /// whatever has not yet been read. Subsequent calls return the cached
    /// array; a snapshot that already exists is returned as-is.
    ///
    /// # Errors
    ///
    /// Unsupported in batch mode; fails when the stream view was already
    /// consumed by a reader.
    pub async fn materialize<T>(&self, key: &str) -> StageResult<Option<Arc<Vec<T>>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        if self.batch_mode {
            return Err(StageError::invalid_config("Stream access not supported in batch mode"));
        }
        if let Some(snapshot) = self.accumulated::<Vec<T>>(key) {
            return Ok(Some(snapshot));
        }
        let buffer = {
            let buffers = self.buffers.read();
            match buffers.get(key) {
                Some(buffer) => Arc::clone(buffer),
                None => return Ok(None),
            }
        };
        if !buffer.claim() {
            return Err(StageError::invalid_config(format!(
                "stream for key {} was already consumed",
                key
            )));
        }
        let mut items: Vec<T> = Vec::new();
        while let Some(value) = buffer.next().await {
            match Arc::downcast::<T>(value) {
                Ok(item) => items.push((*item).clone()),
                Err(_) => return Err(StageError::unhandled("retained stream item type mismatch")),
            }
        }
        self.insert_snapshot(key, items)?;
        Ok(self.accumulated::<Vec<T>>(key))
    }

    /// Keys holding a snapshot, in arbitrary order.
    pub fn snapshot_keys(&self) -> Vec<String> {
        self.snapshots.read().keys().cloned().collect()
    }
}

impl Default for StreamingState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingState")
            .field("batch_mode", &self.batch_mode)
            .field("snapshots", &self.snapshot_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn snapshots_are_inserted_exactly_once() {
        let state = StreamingState::new();
        state.insert_snapshot("parse", vec![1u32, 2, 3]).unwrap();
        assert!(state.insert_snapshot("parse", vec![4u32]).is_err());
        assert_eq!(*state.accumulated::<Vec<u32>>("parse").unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stream_view_prefers_snapshot() {
        let state = StreamingState::new();
        state.insert_snapshot("parse", vec![1u32, 2]).unwrap();
        let stream = state.stream::<u32>("parse").unwrap().unwrap();
        let items: Vec<u32> = stream.try_collect().await.unwrap();
        assert_eq!(items, vec![1, 2]);
    }

    #[tokio::test]
    async fn retained_stream_is_consume_once() {
        let state = StreamingState::new();
        let buffer = state.register_buffer("doubled");
        buffer.push(Arc::new(2u32));
        buffer.push(Arc::new(4u32));
        buffer.close();

        let stream = state.stream::<u32>("doubled").unwrap().unwrap();
        let items: Vec<u32> = stream.try_collect().await.unwrap();
        assert_eq!(items, vec![2, 4]);

        assert!(state.stream::<u32>("doubled").is_err());
    }

    #[tokio::test]
    async fn materialize_caches_a_snapshot() {
        let state = StreamingState::new();
        let buffer = state.register_buffer("doubled");
        buffer.push(Arc::new(2u32));
        buffer.push(Arc::new(4u32));
        buffer.close();

        let first = state.materialize::<u32>("doubled").await.unwrap().unwrap();
        assert_eq!(*first, vec![2, 4]);

        // Second materialization and the stream view both read the cache
        let second = state.materialize::<u32>("doubled").await.unwrap().unwrap();
        assert_eq!(*second, vec![2, 4]);
        let stream = state.stream::<u32>("doubled").unwrap().unwrap();
        let items: Vec<u32> = stream.try_collect().await.unwrap();
        assert_eq!(items, vec![2, 4]);
    }

    #[tokio::test]
    async fn batch_mode_rejects_stream_access() {
        let mut accumulated = AccumulatedState::new();
        accumulated
            .insert("parse", Arc::new(vec![1u32]) as StateValue)
            .unwrap();
        let state = StreamingState::batch_mode(&accumulated);

        assert!(state.stream::<u32>("parse").is_err());
        assert!(state.materialize::<u32>("parse").await.is_err());
        assert_eq!(*state.accumulated::<Vec<u32>>("parse").unwrap(), vec![1]);
    }
}
