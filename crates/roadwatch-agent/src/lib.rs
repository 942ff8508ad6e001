// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Roadwatch edge agent
//!
//! Samples GPS and accelerometer readings on a vehicle, keeps every reading
//! in a local durable queue, and forwards it to a remote collector whenever
//! the link allows.
//!
//! # Features
//!
//! - **Append-before-forward** -- a sample is on disk before any delivery is tried
//! - **At-least-once delivery** -- records stay unsynced until the collector confirms them
//! - **Partial-batch recovery** -- each record is delivered on its own request
//! - **Graceful shutdown** -- both loops are joined within a bounded time
//!
//! # Architecture
//!
//! ```text
//! AgentHandle
//! +-- Collector   (SensorSource -> DurableQueue::append, every sample interval)
//! +-- SyncLoop    (Prober -> fetch_unsynced -> Sink::deliver -> mark_synced)
//! +-- DurableQueue (SQLite, WAL journal)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use roadwatch_agent::{AgentConfig, DeviceAgent, SourceKind};
//!
//! let config = AgentConfig::builder()
//!     .db_path("roadwatch.db")
//!     .sink_url("http://172.20.10.3:5000/data")
//!     .source(SourceKind::Auto)
//!     .build();
//!
//! let handle = DeviceAgent::from_config(config)?.start()?;
//! tokio::signal::ctrl_c().await?;
//! let report = handle.shutdown().await;
//! ```

pub mod collector;
pub mod config;
pub mod lifecycle;
pub mod probe;
pub mod queue;
pub mod sample;
pub mod sensor;
pub mod sink;
pub mod sqlite;
pub mod sync;

pub use collector::{Collector, CollectorStats, CollectorStatsSnapshot};
pub use config::{AgentConfig, AgentConfigBuilder, ConfigError};
pub use lifecycle::{
    build_source, Agent, AgentError, AgentHandle, AgentStats, DeviceAgent, ShutdownReport,
};
pub use probe::{HttpProber, MockProber, ProbeError, Prober};
pub use queue::{DurableQueue, PersistenceError, QueueRecord, DEFAULT_BATCH_LIMIT};
pub use sample::{AccelReading, GpsFix, RecordId, Sample};
pub use sensor::{SensorPoll, SensorReadError, SensorSource, SimulatedSource, SourceKind};
pub use sink::{DeliveryError, HttpSink, MockSink, Sink};
pub use sqlite::{QueueCounts, SqliteQueue};
pub use sync::{CycleOutcome, SyncLoop, SyncPhase, SyncStats, SyncStatsSnapshot};

#[cfg(unix)]
pub use sensor::HardwareSource;
