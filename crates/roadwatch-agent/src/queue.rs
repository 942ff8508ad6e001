// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Durable queue abstraction
//!
//! Samples are appended before any delivery is attempted and carry a
//! `synced` flag that only ever moves from `false` to `true`.
//!
//! Writer roles:
//! - the collector loop is the only caller of [`DurableQueue::append`]
//! - the sync loop is the only caller of [`DurableQueue::mark_synced`]

use crate::sample::{RecordId, Sample};
use thiserror::Error;

/// Default number of records drained per sync cycle.
pub const DEFAULT_BATCH_LIMIT: usize = 50;

/// Queue storage errors.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to open queue storage at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("failed to serialize sample: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A persisted sample awaiting (or past) delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRecord {
    pub id: RecordId,

    /// Capture timestamp text (sortable UTC RFC 3339)
    pub timestamp: String,

    /// Serialized [`Sample`] JSON, delivered verbatim
    pub payload: String,

    pub synced: bool,
}

impl QueueRecord {
    /// Decode the stored payload back into a [`Sample`].
    pub fn sample(&self) -> serde_json::Result<Sample> {
        Sample::from_payload(self.id, &self.payload)
    }
}

/// Durable queue trait
///
/// # Implementations
///
/// - `SqliteQueue` -- file-backed, WAL journal
pub trait DurableQueue: Send + Sync {
    /// Persist a sample with `synced = false`.
    ///
    /// The record is on disk and visible to [`fetch_unsynced`](Self::fetch_unsynced)
    /// once this returns `Ok`.
    fn append(&self, sample: &Sample) -> Result<RecordId, PersistenceError>;

    /// Return up to `limit` unsynced records, oldest first.
    fn fetch_unsynced(&self, limit: usize) -> Result<Vec<QueueRecord>, PersistenceError>;

    /// Flip `synced` to true for every id in `ids`.
    ///
    /// Idempotent: ids already synced (or unknown) are skipped. Returns the
    /// number of records that changed state. On error no record changes.
    fn mark_synced(&self, ids: &[RecordId]) -> Result<usize, PersistenceError>;

    /// Total number of records.
    fn count(&self) -> Result<usize, PersistenceError>;

    /// Number of records still waiting for delivery.
    fn count_unsynced(&self) -> Result<usize, PersistenceError>;
}

impl<Q: DurableQueue + ?Sized> DurableQueue for std::sync::Arc<Q> {
    fn append(&self, sample: &Sample) -> Result<RecordId, PersistenceError> {
        (**self).append(sample)
    }

    fn fetch_unsynced(&self, limit: usize) -> Result<Vec<QueueRecord>, PersistenceError> {
        (**self).fetch_unsynced(limit)
    }

    fn mark_synced(&self, ids: &[RecordId]) -> Result<usize, PersistenceError> {
        (**self).mark_synced(ids)
    }

    fn count(&self) -> Result<usize, PersistenceError> {
        (**self).count()
    }

    fn count_unsynced(&self) -> Result<usize, PersistenceError> {
        (**self).count_unsynced()
    }
}
