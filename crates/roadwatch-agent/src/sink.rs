// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote sink delivery
//!
//! One record per request. A record counts as delivered only when the
//! collector answered with a 2xx status.

use crate::queue::QueueRecord;
use crate::sample::RecordId;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Per-record delivery failure. The record stays unsynced.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("sink rejected record with status {status}")]
    Rejected { status: StatusCode },

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Remote sink trait
pub trait Sink: Send + Sync {
    /// Deliver one record. `Ok` means the sink confirmed it.
    fn deliver(
        &self,
        record: &QueueRecord,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

impl<K: Sink> Sink for std::sync::Arc<K> {
    fn deliver(
        &self,
        record: &QueueRecord,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        (**self).deliver(record)
    }
}

/// HTTP collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Sink for HttpSink {
    async fn deliver(&self, record: &QueueRecord) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(record.payload.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout(self.timeout)
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected { status })
        }
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// In-memory sink recording every accepted record.
#[derive(Debug)]
pub struct MockSink {
    healthy: AtomicBool,
    reject: Mutex<HashSet<RecordId>>,
    delivered: Mutex<Vec<QueueRecord>>,
    attempts: Mutex<Vec<RecordId>>,
}

impl MockSink {
    /// Sink that accepts every record.
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            reject: Mutex::new(HashSet::new()),
            delivered: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// When unhealthy every delivery fails with a transport error.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Reject these ids with a 500 until cleared.
    pub fn reject_ids(&self, ids: impl IntoIterator<Item = RecordId>) {
        lock(&self.reject).extend(ids);
    }

    pub fn clear_rejections(&self) {
        lock(&self.reject).clear();
    }

    /// Records accepted so far, in delivery order.
    pub fn delivered(&self) -> Vec<QueueRecord> {
        lock(&self.delivered).clone()
    }

    /// Every id a delivery was attempted for, in order.
    pub fn attempts(&self) -> Vec<RecordId> {
        lock(&self.attempts).clone()
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for MockSink {
    async fn deliver(&self, record: &QueueRecord) -> Result<(), DeliveryError> {
        lock(&self.attempts).push(record.id);

        if !self.healthy.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("connection refused".to_string()));
        }
        if lock(&self.reject).contains(&record.id) {
            return Err(DeliveryError::Rejected {
                status: StatusCode::INTERNAL_SERVER_ERROR,
            });
        }

        lock(&self.delivered).push(record.clone());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
