// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sync loop
//!
//! Forwards queued samples to the remote sink.
//!
//! # Cycle
//!
//! ```text
//! IDLE -> PROBING -> DRAINING -> DELIVERING -> MARKING -> IDLE
//!            |           |
//!            +-----------+--> IDLE (unreachable / nothing pending)
//! ```
//!
//! Records are delivered one request each. Only ids the sink confirmed are
//! marked synced, in one batched call after the delivery pass. Anything
//! left unsynced is picked up again on the next period.

use crate::probe::Prober;
use crate::queue::DurableQueue;
use crate::sample::RecordId;
use crate::sink::Sink;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Sync cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Probing,
    Draining,
    Delivering,
    Marking,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Probing => "probing",
            SyncPhase::Draining => "draining",
            SyncPhase::Delivering => "delivering",
            SyncPhase::Marking => "marking",
        };
        f.write_str(name)
    }
}

/// What one sync cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Probe failed; nothing was fetched or sent.
    Unreachable,

    /// Queue had no unsynced records.
    Idle,

    /// Fetching the batch failed; nothing was sent.
    DrainFailed,

    /// Delivery pass finished and confirmed ids were marked.
    Completed {
        attempted: usize,
        delivered: usize,
        failed: usize,
    },

    /// Records were delivered but marking them failed; they stay unsynced
    /// and will be sent again.
    MarkFailed { delivered: usize },
}

/// Sync loop statistics
#[derive(Debug, Default)]
pub struct SyncStats {
    /// Cycles started
    pub cycles: AtomicU64,
    /// Cycles skipped because the sink was unreachable
    pub skipped_unreachable: AtomicU64,
    /// Delivery attempts
    pub records_attempted: AtomicU64,
    /// Records confirmed by the sink
    pub records_delivered: AtomicU64,
    /// Records the sink refused or never answered
    pub records_failed: AtomicU64,
    /// Records marked synced
    pub records_marked: AtomicU64,
    /// Failed fetch or mark operations
    pub queue_errors: AtomicU64,
}

impl SyncStats {
    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            skipped_unreachable: self.skipped_unreachable.load(Ordering::Relaxed),
            records_attempted: self.records_attempted.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            records_marked: self.records_marked.load(Ordering::Relaxed),
            queue_errors: self.queue_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sync statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStatsSnapshot {
    pub cycles: u64,
    pub skipped_unreachable: u64,
    pub records_attempted: u64,
    pub records_delivered: u64,
    pub records_failed: u64,
    pub records_marked: u64,
    pub queue_errors: u64,
}

/// Shortest sync period; shorter ones are raised to this.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Sync loop
///
/// Exactly one instance runs per queue; it is the only caller of
/// [`DurableQueue::mark_synced`].
pub struct SyncLoop<Q: DurableQueue, K: Sink, P: Prober> {
    queue: Q,
    sink: K,
    prober: P,
    batch_limit: usize,
    period: Duration,
    shutdown: CancellationToken,
    phase: SyncPhase,
    stats: Arc<SyncStats>,
}

impl<Q: DurableQueue, K: Sink, P: Prober> SyncLoop<Q, K, P> {
    /// `batch_limit` is raised to 1 and `period` to one millisecond.
    pub fn new(
        queue: Q,
        sink: K,
        prober: P,
        batch_limit: usize,
        period: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            sink,
            prober,
            batch_limit: batch_limit.max(1),
            period: period.max(MIN_PERIOD),
            shutdown,
            phase: SyncPhase::Idle,
            stats: Arc::new(SyncStats::default()),
        }
    }

    /// Shared handle to the live statistics.
    pub fn stats(&self) -> Arc<SyncStats> {
        Arc::clone(&self.stats)
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    fn enter(&mut self, phase: SyncPhase) {
        tracing::trace!("Sync phase {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Run one probe, drain, deliver, mark cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let outcome = self.cycle().await;
        self.enter(SyncPhase::Idle);
        outcome
    }

    async fn cycle(&mut self) -> CycleOutcome {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        self.enter(SyncPhase::Probing);
        if !self.prober.is_reachable().await {
            self.stats.skipped_unreachable.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Sink unreachable, skipping sync cycle");
            return CycleOutcome::Unreachable;
        }

        self.enter(SyncPhase::Draining);
        let batch = match self.queue.fetch_unsynced(self.batch_limit) {
            Ok(batch) => batch,
            Err(e) => {
                self.stats.queue_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Failed to fetch unsynced records: {}", e);
                return CycleOutcome::DrainFailed;
            }
        };

        if batch.is_empty() {
            tracing::debug!("No unsynced records");
            return CycleOutcome::Idle;
        }

        self.enter(SyncPhase::Delivering);
        let mut delivered: Vec<RecordId> = Vec::with_capacity(batch.len());
        let mut attempted = 0usize;

        for record in &batch {
            if self.shutdown.is_cancelled() {
                tracing::info!(
                    "Shutdown requested, stopping delivery after {} of {} records",
                    attempted,
                    batch.len()
                );
                break;
            }

            attempted += 1;
            self.stats.records_attempted.fetch_add(1, Ordering::Relaxed);

            match self.sink.deliver(record).await {
                Ok(()) => {
                    self.stats.records_delivered.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Delivered record {}", record.id);
                    delivered.push(record.id);
                }
                Err(e) => {
                    self.stats.records_failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Delivery of record {} failed: {}", record.id, e);
                }
            }
        }

        let failed = attempted - delivered.len();
        if delivered.is_empty() {
            return CycleOutcome::Completed {
                attempted,
                delivered: 0,
                failed,
            };
        }

        self.enter(SyncPhase::Marking);
        match self.queue.mark_synced(&delivered) {
            Ok(marked) => {
                self.stats
                    .records_marked
                    .fetch_add(marked as u64, Ordering::Relaxed);
                tracing::info!(
                    "Synced {} of {} records ({} failed)",
                    delivered.len(),
                    attempted,
                    failed
                );
                CycleOutcome::Completed {
                    attempted,
                    delivered: delivered.len(),
                    failed,
                }
            }
            Err(e) => {
                self.stats.queue_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    "Failed to mark {} delivered records synced (ids {}..={}): {}",
                    delivered.len(),
                    delivered[0],
                    delivered[delivered.len() - 1],
                    e
                );
                CycleOutcome::MarkFailed {
                    delivered: delivered.len(),
                }
            }
        }
    }

    /// Run cycles every period until cancelled.
    ///
    /// The first cycle starts immediately. An in-flight cycle is allowed to
    /// finish its current delivery before the loop exits.
    pub async fn run(mut self) -> SyncStatsSnapshot {
        tracing::info!(
            "Sync loop started (period: {:?}, batch limit: {})",
            self.period,
            self.batch_limit
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    let outcome = self.run_cycle().await;
                    tracing::debug!("Sync cycle finished: {:?}", outcome);
                }
            }
        }

        let snapshot = self.stats.snapshot();
        tracing::info!(
            "Sync loop stopped ({} delivered, {} failed attempts)",
            snapshot.records_delivered,
            snapshot.records_failed
        );
        snapshot
    }
}
