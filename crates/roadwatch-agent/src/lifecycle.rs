// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lifecycle controller
//!
//! Starts the collector and sync loops on the tokio runtime, hands out an
//! [`AgentHandle`], and on shutdown cancels both loops and joins them within
//! a bounded time. A loop is never killed: one that misses the deadline is
//! left to finish in the background and reported.

use crate::collector::{Collector, CollectorStats, CollectorStatsSnapshot};
use crate::config::{AgentConfig, ConfigError};
use crate::probe::{HttpProber, ProbeError, Prober};
use crate::queue::{DurableQueue, PersistenceError};
use crate::sensor::{SensorReadError, SensorSource, SimulatedSource, SourceKind};
use crate::sink::{DeliveryError, HttpSink, Sink};
use crate::sqlite::SqliteQueue;
use crate::sync::{SyncLoop, SyncStats, SyncStatsSnapshot};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Agent startup errors.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorReadError),

    #[error("Sink error: {0}")]
    Sink(#[from] DeliveryError),

    #[error("Prober error: {0}")]
    Probe(#[from] ProbeError),
}

/// Agent wired to the real queue file, sensors and HTTP collector.
pub type DeviceAgent = Agent<SqliteQueue, Box<dyn SensorSource>, HttpSink, HttpProber>;

/// Open the sensor source selected by `config.source`.
///
/// `auto` falls back to simulation when no hardware can be opened;
/// `hardware` fails instead.
pub fn build_source(config: &AgentConfig) -> Result<Box<dyn SensorSource>, AgentError> {
    match config.source {
        SourceKind::Simulated => Ok(Box::new(SimulatedSource::new())),
        SourceKind::Hardware => open_hardware(config),
        SourceKind::Auto => match open_hardware(config) {
            Ok(source) => Ok(source),
            Err(e) => {
                tracing::warn!("Hardware sensors unavailable ({}), using simulated source", e);
                Ok(Box::new(SimulatedSource::new()))
            }
        },
    }
}

#[cfg(unix)]
fn open_hardware(config: &AgentConfig) -> Result<Box<dyn SensorSource>, AgentError> {
    let source = crate::sensor::HardwareSource::open(
        &config.gps_device,
        config.gps_baud,
        &config.i2c_bus,
        config.mpu_address,
    )?;
    Ok(Box::new(source))
}

#[cfg(not(unix))]
fn open_hardware(_config: &AgentConfig) -> Result<Box<dyn SensorSource>, AgentError> {
    Err(SensorReadError::Disconnected("hardware sensors require a unix host").into())
}

/// Unstarted agent: the queue, the sensor source and the remote side.
pub struct Agent<Q, S, K, P> {
    config: AgentConfig,
    queue: Arc<Q>,
    source: S,
    sink: K,
    prober: P,
}

impl DeviceAgent {
    /// Build every component from configuration.
    ///
    /// Failing to open the queue file is fatal.
    pub fn from_config(config: AgentConfig) -> Result<Self, AgentError> {
        config.validate()?;

        let queue = Arc::new(SqliteQueue::open(&config.db_path)?);
        let source = build_source(&config)?;
        let sink = HttpSink::new(config.sink_url.clone(), config.sink_timeout())?;
        let prober = HttpProber::new(config.effective_probe_url()?, config.probe_timeout())?;

        Ok(Agent::new(config, queue, source, sink, prober))
    }
}

impl<Q, S, K, P> Agent<Q, S, K, P>
where
    Q: DurableQueue + 'static,
    S: SensorSource + 'static,
    K: Sink + 'static,
    P: Prober + 'static,
{
    pub fn new(config: AgentConfig, queue: Arc<Q>, source: S, sink: K, prober: P) -> Self {
        Self {
            config,
            queue,
            source,
            sink,
            prober,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Shared queue handle.
    pub fn queue(&self) -> Arc<Q> {
        Arc::clone(&self.queue)
    }

    /// Validate the configuration and spawn both loops.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(self) -> Result<AgentHandle, AgentError> {
        self.config.validate()?;
        let shutdown = CancellationToken::new();

        let collector = Collector::new(
            Arc::clone(&self.queue),
            self.source,
            self.config.sample_interval(),
            shutdown.child_token(),
        );
        let sync = SyncLoop::new(
            Arc::clone(&self.queue),
            self.sink,
            self.prober,
            self.config.batch_limit,
            self.config.sync_interval(),
            shutdown.child_token(),
        );

        let collector_stats = collector.stats();
        let sync_stats = sync.stats();

        tracing::info!(
            "Agent started (sample every {:?}, sync every {:?})",
            self.config.sample_interval(),
            self.config.sync_interval()
        );

        Ok(AgentHandle {
            shutdown,
            collector: tokio::spawn(collector.run()),
            sync: tokio::spawn(sync.run()),
            collector_stats,
            sync_stats,
            shutdown_timeout: self.config.shutdown_timeout(),
            started: Instant::now(),
        })
    }
}

/// Live statistics of a running agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub collector: CollectorStatsSnapshot,
    pub sync: SyncStatsSnapshot,
    pub uptime_secs: u64,
}

/// Outcome of [`AgentHandle::shutdown`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub stats: AgentStats,

    /// Loops that ended with a panic.
    pub failed: Vec<&'static str>,

    /// Loops still running at the deadline, left detached.
    pub timed_out: Vec<&'static str>,
}

impl ShutdownReport {
    /// Both loops exited on their own.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.timed_out.is_empty()
    }
}

/// Handle to a running agent.
pub struct AgentHandle {
    shutdown: CancellationToken,
    collector: JoinHandle<CollectorStatsSnapshot>,
    sync: JoinHandle<SyncStatsSnapshot>,
    collector_stats: Arc<CollectorStats>,
    sync_stats: Arc<SyncStats>,
    shutdown_timeout: Duration,
    started: Instant,
}

impl AgentHandle {
    /// Check if the agent is running.
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && !(self.collector.is_finished() && self.sync.is_finished())
    }

    /// Request both loops to stop at their next iteration boundary.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Token cancelled when shutdown is requested.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            collector: self.collector_stats.snapshot(),
            sync: self.sync_stats.snapshot(),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }

    /// Stop both loops and wait for them, up to the configured timeout.
    ///
    /// A loop still running at the deadline is not aborted. Its handle is
    /// dropped so the task finishes on its own once its current await
    /// returns, and it is listed in [`ShutdownReport::timed_out`].
    pub async fn shutdown(self) -> ShutdownReport {
        let timeout = self.shutdown_timeout;
        self.shutdown_within(timeout).await
    }

    pub async fn shutdown_within(mut self, timeout: Duration) -> ShutdownReport {
        tracing::info!("Shutting down agent (timeout {:?})", timeout);
        self.shutdown.cancel();

        let deadline = tokio::time::Instant::now() + timeout;
        let mut report = ShutdownReport::default();

        let loops = [
            ("collector", join_by(deadline, &mut self.collector, "collector").await),
            ("sync", join_by(deadline, &mut self.sync, "sync").await),
        ];
        for (name, outcome) in loops {
            match outcome {
                JoinOutcome::Stopped => {}
                JoinOutcome::Failed => report.failed.push(name),
                JoinOutcome::TimedOut => report.timed_out.push(name),
            }
        }
        report.stats = self.stats();

        if report.is_clean() {
            tracing::info!("Agent stopped cleanly");
        } else {
            tracing::warn!(
                "Agent stopped (failed: {:?}, timed out: {:?})",
                report.failed,
                report.timed_out
            );
        }
        report
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinOutcome {
    Stopped,
    Failed,
    TimedOut,
}

/// Wait for `handle` until `deadline`. The task is never aborted.
async fn join_by<T>(
    deadline: tokio::time::Instant,
    handle: &mut JoinHandle<T>,
    name: &str,
) -> JoinOutcome {
    match tokio::time::timeout_at(deadline, &mut *handle).await {
        Ok(Ok(_)) => JoinOutcome::Stopped,
        Ok(Err(e)) => {
            tracing::error!("{} task failed: {}", name, e);
            JoinOutcome::Failed
        }
        Err(_) => {
            tracing::warn!("{} loop did not stop in time, leaving it detached", name);
            JoinOutcome::TimedOut
        }
    }
}
