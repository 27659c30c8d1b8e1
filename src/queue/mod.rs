//! Durable FIFO work queue shared by the listing and content stages
//!
//! # Components
//!
//! - `QueueEnvelope`: tagged entry, either a job id or a worker summary
//! - `WorkQueue`: backend trait with atomic single-entry push/pop per key
//! - `SqliteQueue`: durable backend usable across processes
//! - `MemoryQueue`: in-process backend
//! - `QueueHandle`: key-bound handle with a blocking `pop(timeout)`

mod envelope;
mod memory;
mod sqlite;

pub use envelope::QueueEnvelope;
pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors that can occur during queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed queue entry {payload:?}: {source}")]
    Decode {
        payload: String,
        source: serde_json::Error,
    },

    #[error("Queue lock poisoned")]
    LockPoisoned,
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Backend of the work queue
///
/// Each method is atomic on its own; FIFO order holds within one key.
pub trait WorkQueue: Send + Sync {
    /// Appends a serialized entry to the tail of `key`
    fn push(&self, key: &str, payload: &str) -> QueueResult<()>;

    /// Removes and returns the head of `key`, if any
    fn try_pop(&self, key: &str) -> QueueResult<Option<String>>;

    /// Number of entries under `key`
    fn len(&self, key: &str) -> QueueResult<u64>;
}

/// A work queue bound to one key
#[derive(Clone)]
pub struct QueueHandle {
    backend: Arc<dyn WorkQueue>,
    key: String,
    poll_interval: Duration,
}

impl QueueHandle {
    pub fn new(backend: Arc<dyn WorkQueue>, key: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            backend,
            key: key.into(),
            poll_interval,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Appends an envelope to the tail
    pub fn put(&self, envelope: &QueueEnvelope) -> QueueResult<()> {
        self.backend.push(&self.key, &envelope.encode()?)
    }

    /// Removes the head envelope without waiting
    ///
    /// A malformed entry is consumed and reported as `QueueError::Decode`.
    pub fn try_pop(&self) -> QueueResult<Option<QueueEnvelope>> {
        match self.backend.try_pop(&self.key)? {
            Some(payload) => QueueEnvelope::decode(&payload).map(Some),
            None => Ok(None),
        }
    }

    /// Waits up to `timeout` for a head envelope
    ///
    /// Returns `Ok(None)` when the queue stayed empty for the whole timeout.
    pub async fn pop(&self, timeout: Duration) -> QueueResult<Option<QueueEnvelope>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(envelope) = self.try_pop()? {
                return Ok(Some(envelope));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Number of entries currently queued
    pub fn size(&self) -> QueueResult<u64> {
        self.backend.len(&self.key)
    }
}
