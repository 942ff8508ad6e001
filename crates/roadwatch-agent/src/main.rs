// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Roadwatch agent CLI
//!
//! Runs the store-and-forward agent on the vehicle.
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (auto-detect sensors, local collector)
//! roadwatch-agent
//!
//! # Point at a collector and force simulated sensors
//! roadwatch-agent --sink-url http://172.20.10.3:5000/data --source simulated
//!
//! # Using configuration file
//! roadwatch-agent --config roadwatch.toml
//!
//! # Inspect the queue
//! roadwatch-agent stats
//! roadwatch-agent pending --limit 20
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roadwatch_agent::{
    AgentConfig, AgentStats, DeviceAgent, DurableQueue, HttpProber, HttpSink, SourceKind,
    SqliteQueue, SyncLoop,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Roadwatch edge telemetry agent
#[derive(Parser, Debug)]
#[command(name = "roadwatch-agent")]
#[command(about = "Roadwatch edge agent - sensor sampling with store-and-forward sync")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "ROADWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Queue database path (SQLite file)
    #[arg(long, env = "ROADWATCH_DB")]
    db: Option<PathBuf>,

    /// Collector endpoint URL
    #[arg(long, env = "ROADWATCH_SINK_URL")]
    sink_url: Option<String>,

    /// Health endpoint URL (default: root of the collector)
    #[arg(long, env = "ROADWATCH_PROBE_URL")]
    probe_url: Option<String>,

    /// Sampling interval (milliseconds)
    #[arg(long, env = "ROADWATCH_SAMPLE_INTERVAL_MS")]
    sample_interval_ms: Option<u64>,

    /// Sync period (seconds)
    #[arg(long, env = "ROADWATCH_SYNC_INTERVAL_SECS")]
    sync_interval_secs: Option<u64>,

    /// Records per sync cycle
    #[arg(long, env = "ROADWATCH_BATCH_LIMIT")]
    batch_limit: Option<usize>,

    /// Per-record delivery timeout (milliseconds)
    #[arg(long, env = "ROADWATCH_SINK_TIMEOUT_MS")]
    sink_timeout_ms: Option<u64>,

    /// Probe timeout (milliseconds)
    #[arg(long, env = "ROADWATCH_PROBE_TIMEOUT_MS")]
    probe_timeout_ms: Option<u64>,

    /// Sensor source
    #[arg(long, value_enum, env = "ROADWATCH_SOURCE")]
    source: Option<SourceKind>,

    /// GPS serial device
    #[arg(long, env = "ROADWATCH_GPS_DEVICE")]
    gps_device: Option<PathBuf>,

    /// I2C bus device
    #[arg(long, env = "ROADWATCH_I2C_BUS")]
    i2c_bus: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "ROADWATCH_LOG_LEVEL")]
    log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "ROADWATCH_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show queue statistics
    Stats,

    /// List the oldest unsynced records
    Pending {
        /// Maximum records to list
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Run a single sync cycle and exit
    SyncOnce,

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "roadwatch.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    if let Some(Commands::GenConfig { output }) = &args.command {
        return cmd_gen_config(output);
    }

    let config = build_config(&args)?;

    match args.command {
        Some(Commands::Stats) => cmd_stats(&config),
        Some(Commands::Pending { limit }) => cmd_pending(&config, limit),
        Some(Commands::SyncOnce) => cmd_sync_once(&config).await,
        Some(Commands::GenConfig { .. }) | None => run_agent(config).await,
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match args.log_file {
        Some(ref path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
        }
    }

    Ok(())
}

/// Defaults, then the config file, then flags and environment.
fn build_config(args: &Args) -> Result<AgentConfig> {
    let base = match args.config {
        Some(ref path) => AgentConfig::from_file(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => AgentConfig::default(),
    };

    let mut builder = AgentConfig::builder().base(base);
    if let Some(ref db) = args.db {
        builder = builder.db_path(db);
    }
    if let Some(ref url) = args.sink_url {
        builder = builder.sink_url(url);
    }
    if let Some(ref url) = args.probe_url {
        builder = builder.probe_url(url);
    }
    if let Some(ms) = args.sample_interval_ms {
        builder = builder.sample_interval(Duration::from_millis(ms));
    }
    if let Some(secs) = args.sync_interval_secs {
        builder = builder.sync_interval(Duration::from_secs(secs));
    }
    if let Some(limit) = args.batch_limit {
        builder = builder.batch_limit(limit);
    }
    if let Some(ms) = args.sink_timeout_ms {
        builder = builder.sink_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = args.probe_timeout_ms {
        builder = builder.probe_timeout(Duration::from_millis(ms));
    }
    if let Some(source) = args.source {
        builder = builder.source(source);
    }
    if let Some(ref device) = args.gps_device {
        builder = builder.gps_device(device);
    }
    if let Some(ref bus) = args.i2c_bus {
        builder = builder.i2c_bus(bus);
    }

    let config = builder.build();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run_agent(config: AgentConfig) -> Result<()> {
    tracing::info!("Roadwatch agent v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Queue: {}", config.db_path.display());
    tracing::info!("  Sink: {}", config.sink_url);
    tracing::info!("  Source: {:?}", config.source);

    let agent = DeviceAgent::from_config(config).context("failed to start agent")?;
    let pending = agent.queue().count_unsynced()?;
    if pending > 0 {
        tracing::info!("  {} records pending from a previous run", pending);
    }

    let handle = agent.start().context("failed to start agent")?;

    wait_for_signal().await?;
    tracing::info!("Shutdown signal received");

    let report = handle.shutdown().await;
    println!("\nFinal Statistics:");
    print_stats(&report.stats);
    if !report.is_clean() {
        println!(
            "  Loops failed: {:?}, still running at exit: {:?}",
            report.failed, report.timed_out
        );
    }

    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

fn open_queue(config: &AgentConfig) -> Result<SqliteQueue> {
    SqliteQueue::open(&config.db_path)
        .with_context(|| format!("cannot open queue at {}", config.db_path.display()))
}

fn cmd_stats(config: &AgentConfig) -> Result<()> {
    let queue = open_queue(config)?;
    let counts = queue.counts()?;

    println!("Queue: {}", config.db_path.display());
    println!("  Total records:   {}", counts.total);
    println!("  Pending (unsynced): {}", counts.unsynced);
    println!("  Synced:          {}", counts.synced());
    Ok(())
}

fn cmd_pending(config: &AgentConfig, limit: usize) -> Result<()> {
    let queue = open_queue(config)?;
    let records = queue.fetch_unsynced(limit)?;

    println!("{} oldest unsynced records:", records.len());
    for record in &records {
        println!("  id={}, ts={}, {}", record.id, record.timestamp, record.payload);
    }
    Ok(())
}

async fn cmd_sync_once(config: &AgentConfig) -> Result<()> {
    let queue = Arc::new(open_queue(config)?);
    let sink = HttpSink::new(config.sink_url.clone(), config.sink_timeout())?;
    let prober = HttpProber::new(config.effective_probe_url()?, config.probe_timeout())?;

    let mut sync = SyncLoop::new(
        Arc::clone(&queue),
        sink,
        prober,
        config.batch_limit,
        config.sync_interval(),
        CancellationToken::new(),
    );

    let outcome = sync.run_cycle().await;
    println!("Sync cycle: {:?}", outcome);
    println!("Pending after cycle: {}", queue.count_unsynced()?);
    Ok(())
}

fn cmd_gen_config(output: &Path) -> Result<()> {
    let toml_str = toml::to_string_pretty(&AgentConfig::default())?;

    let content = format!(
        r#"# Roadwatch Agent Configuration
# Generated by roadwatch-agent gen-config
#
# source: "auto" (hardware, else simulated), "hardware" or "simulated"
# probe_url: health endpoint, defaults to the root of sink_url
# Every option can be overridden by a flag or a ROADWATCH_* variable.

{}
"#,
        toml_str
    );

    std::fs::write(output, content)
        .with_context(|| format!("cannot write {}", output.display()))?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn print_stats(stats: &AgentStats) {
    println!("--- Agent Statistics (uptime {}s) ---", stats.uptime_secs);
    println!(
        "  Collector: {} ticks, {} stored, {} lost, {} GPS errors, {} accel errors",
        stats.collector.ticks,
        stats.collector.samples_appended,
        stats.collector.append_failures,
        stats.collector.gps_read_errors,
        stats.collector.accel_read_errors
    );
    println!(
        "  Sync: {} cycles ({} unreachable), {} attempted, {} delivered, {} failed, \
         {} queue errors",
        stats.sync.cycles,
        stats.sync.skipped_unreachable,
        stats.sync.records_attempted,
        stats.sync.records_delivered,
        stats.sync.records_failed,
        stats.sync.queue_errors
    );
}
