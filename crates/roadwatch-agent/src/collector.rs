// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collector loop
//!
//! Polls the sensor source at a fixed period and appends every sample to the
//! durable queue.
//!
//! # Operation
//!
//! 1. Wait for the next sampling tick (or cancellation)
//! 2. Poll the source; failed fields are left absent
//! 3. Append the sample; an append failure loses only that sample
//! 4. On cancellation release the source and return

use crate::queue::DurableQueue;
use crate::sample::RecordId;
use crate::sensor::SensorSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Collector statistics
#[derive(Debug, Default)]
pub struct CollectorStats {
    /// Sampling ticks processed
    pub ticks: AtomicU64,
    /// Samples persisted
    pub samples_appended: AtomicU64,
    /// Samples lost to queue errors
    pub append_failures: AtomicU64,
    /// GPS read failures
    pub gps_read_errors: AtomicU64,
    /// Accelerometer read failures
    pub accel_read_errors: AtomicU64,
}

impl CollectorStats {
    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> CollectorStatsSnapshot {
        CollectorStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            samples_appended: self.samples_appended.load(Ordering::Relaxed),
            append_failures: self.append_failures.load(Ordering::Relaxed),
            gps_read_errors: self.gps_read_errors.load(Ordering::Relaxed),
            accel_read_errors: self.accel_read_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of collector statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStatsSnapshot {
    pub ticks: u64,
    pub samples_appended: u64,
    pub append_failures: u64,
    pub gps_read_errors: u64,
    pub accel_read_errors: u64,
}

/// Shortest sampling period; shorter ones are raised to this.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Collector loop
pub struct Collector<Q: DurableQueue, S: SensorSource> {
    queue: Q,
    source: S,
    period: Duration,
    shutdown: CancellationToken,
    stats: Arc<CollectorStats>,
}

impl<Q: DurableQueue, S: SensorSource> Collector<Q, S> {
    /// Create a collector sampling every `period` until `shutdown` fires.
    ///
    /// `period` is raised to at least one millisecond.
    pub fn new(queue: Q, source: S, period: Duration, shutdown: CancellationToken) -> Self {
        Self {
            queue,
            source,
            period: period.max(MIN_PERIOD),
            shutdown,
            stats: Arc::new(CollectorStats::default()),
        }
    }

    /// Shared handle to the live statistics.
    pub fn stats(&self) -> Arc<CollectorStats> {
        Arc::clone(&self.stats)
    }

    /// Poll once and persist the result.
    ///
    /// Returns the new record id, or `None` if the append failed.
    pub fn collect_once(&mut self) -> Option<RecordId> {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        let poll = self.source.poll();
        if let Some(e) = poll.gps_error {
            self.stats.gps_read_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("GPS read failed: {}", e);
        }
        if let Some(e) = poll.accel_error {
            self.stats.accel_read_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Accelerometer read failed: {}", e);
        }

        match self.queue.append(&poll.sample) {
            Ok(id) => {
                self.stats.samples_appended.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    "Stored sample: id={}, gps={}, accel={}",
                    id,
                    poll.sample.gps.is_some(),
                    poll.sample.accelerometer.is_some()
                );
                Some(id)
            }
            Err(e) => {
                self.stats.append_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Failed to store sample: {}", e);
                None
            }
        }
    }

    /// Run until cancelled, then release the source.
    pub async fn run(mut self) -> CollectorStatsSnapshot {
        tracing::info!(
            "Collector started (source: {}, period: {:?})",
            self.source.name(),
            self.period
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    self.collect_once();
                }
            }
        }

        self.source.release();

        let snapshot = self.stats.snapshot();
        tracing::info!(
            "Collector stopped ({} samples stored, {} lost)",
            snapshot.samples_appended,
            snapshot.append_failures
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{PersistenceError, QueueRecord};
    use crate::sample::{AccelReading, GpsFix, Sample};
    use crate::sensor::{SensorReadError, SimulatedSource};
    use crate::sqlite::SqliteQueue;
    use std::sync::atomic::AtomicBool;

    /// Accelerometer-only source with a GPS that never answers.
    struct NoFixSource {
        released: Arc<AtomicBool>,
    }

    impl SensorSource for NoFixSource {
        fn read_gps(&mut self) -> Result<Option<GpsFix>, SensorReadError> {
            Err(SensorReadError::Disconnected("gps"))
        }

        fn read_accelerometer(&mut self) -> Result<Option<AccelReading>, SensorReadError> {
            Ok(Some(AccelReading::from_raw(100, -13000, -7000)))
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "no-fix"
        }
    }

    struct BrokenQueue;

    impl DurableQueue for BrokenQueue {
        fn append(&self, _sample: &Sample) -> Result<RecordId, PersistenceError> {
            Err(PersistenceError::Storage(rusqlite::Error::InvalidQuery))
        }

        fn fetch_unsynced(&self, _limit: usize) -> Result<Vec<QueueRecord>, PersistenceError> {
            Ok(Vec::new())
        }

        fn mark_synced(&self, _ids: &[RecordId]) -> Result<usize, PersistenceError> {
            Ok(0)
        }

        fn count(&self) -> Result<usize, PersistenceError> {
            Ok(0)
        }

        fn count_unsynced(&self) -> Result<usize, PersistenceError> {
            Ok(0)
        }
    }

    #[test]
    fn test_gps_failure_still_stores_sample() {
        let queue = Arc::new(SqliteQueue::new_in_memory().unwrap());
        let source = NoFixSource {
            released: Arc::new(AtomicBool::new(false)),
        };
        let mut collector = Collector::new(
            Arc::clone(&queue),
            source,
            Duration::from_secs(1),
            CancellationToken::new(),
        );

        assert!(collector.collect_once().is_some());

        let records = queue.fetch_unsynced(10).unwrap();
        assert_eq!(records.len(), 1);
        let sample = records[0].sample().unwrap();
        assert!(sample.gps.is_none());
        assert_eq!(sample.accelerometer.unwrap().raw_x, 100);

        let stats = collector.stats().snapshot();
        assert_eq!(stats.gps_read_errors, 1);
        assert_eq!(stats.accel_read_errors, 0);
        assert_eq!(stats.samples_appended, 1);
    }

    #[test]
    fn test_append_failure_is_counted_and_survived() {
        let mut collector = Collector::new(
            BrokenQueue,
            SimulatedSource::with_seed(1),
            Duration::from_secs(1),
            CancellationToken::new(),
        );

        assert!(collector.collect_once().is_none());
        assert!(collector.collect_once().is_none());

        let stats = collector.stats().snapshot();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.append_failures, 2);
        assert_eq!(stats.samples_appended, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_and_releases() {
        let queue = Arc::new(SqliteQueue::new_in_memory().unwrap());
        let released = Arc::new(AtomicBool::new(false));
        let token = CancellationToken::new();

        let collector = Collector::new(
            Arc::clone(&queue),
            NoFixSource {
                released: Arc::clone(&released),
            },
            Duration::from_millis(10),
            token.clone(),
        );
        let handle = tokio::spawn(collector.run());

        tokio::time::sleep(Duration::from_millis(80)).await;
        token.cancel();

        let snapshot = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(snapshot.samples_appended >= 1);
        assert_eq!(queue.count().unwrap() as u64, snapshot.samples_appended);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_zero_period_is_raised_and_loop_runs() {
        let queue = Arc::new(SqliteQueue::new_in_memory().unwrap());
        let token = CancellationToken::new();

        let collector = Collector::new(
            Arc::clone(&queue),
            SimulatedSource::with_seed(4),
            Duration::ZERO,
            token.clone(),
        );
        let handle = tokio::spawn(collector.run());

        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();

        let snapshot = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.samples_appended >= 1);
        assert_eq!(queue.count().unwrap() as u64, snapshot.samples_appended);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_appends_nothing() {
        let queue = Arc::new(SqliteQueue::new_in_memory().unwrap());
        let token = CancellationToken::new();
        token.cancel();

        let collector = Collector::new(
            Arc::clone(&queue),
            SimulatedSource::with_seed(3),
            Duration::from_millis(10),
            token,
        );
        let snapshot = collector.run().await;

        assert_eq!(snapshot.samples_appended, 0);
        assert_eq!(queue.count().unwrap(), 0);
    }
}
