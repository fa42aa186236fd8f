//! GIS PD Monitor - partial-discharge online monitoring service
//!
//! Subscribes to a sensor topic on an MQTT broker, decodes each frame into a
//! cycle of calibrated samples, keeps the PRPD accumulation and PRPS surface
//! windows, optionally logs everything to SQLite and serves the dashboard API.
//!
//! # Usage
//!
//! ```bash
//! # Connect to the configured broker
//! cargo run --release
//!
//! # Another broker/topic, with persistence on from the start
//! ./gis-pd-monitor --host 10.0.0.5 --topic pub2 --persist
//!
//! # Replay captured frames (one hex payload per line) instead of MQTT
//! ./gis-pd-monitor --replay capture.txt --replay-interval-ms 20
//! ```
//!
//! # Environment Variables
//!
//! - `PD_MONITOR_CONFIG`: Path to the TOML config file
//! - `PD_MONITOR_CORS_ORIGINS`: Allowed cross-origin dashboard origins
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gis_pd_monitor::acquisition::{BrokerTarget, IngestController, IngestSettings, ReplaySource};
use gis_pd_monitor::api::{create_app, MonitorState};
use gis_pd_monitor::config::{self, MonitorConfig};
use gis_pd_monitor::pipeline::{DispatchLoop, DispatchTiming, IngestQueue, SharedState};
use gis_pd_monitor::storage::CycleLog;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "gis-pd-monitor")]
#[command(about = "GIS partial-discharge monitor: MQTT ingestion, PRPD/PRPS projection, live cycle API")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides the default search order)
    #[arg(short, long, env = "PD_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// MQTT broker host
    #[arg(long, env = "PD_MQTT_HOST")]
    host: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "PD_MQTT_PORT")]
    port: Option<u16>,

    /// Sensor topic to subscribe to
    #[arg(long, env = "PD_MQTT_TOPIC")]
    topic: Option<String>,

    /// Override the server address (default: "0.0.0.0:8000")
    #[arg(short, long, env = "PD_SERVER_ADDR")]
    addr: Option<String>,

    /// SQLite database file
    #[arg(long, env = "PD_DB_PATH")]
    db: Option<PathBuf>,

    /// Persist cycles and raw frames from startup
    #[arg(long)]
    persist: bool,

    /// Do not connect to the broker on startup (use POST /api/connection)
    #[arg(long)]
    no_connect: bool,

    /// Replay captured hex frames from a file instead of connecting
    #[arg(long, value_name = "FILE", conflicts_with = "no_connect")]
    replay: Option<PathBuf>,

    /// Delay between replayed frames (0 = as fast as the queue accepts)
    #[arg(long, default_value = "20")]
    replay_interval_ms: u64,

    /// Delete the database file before starting.
    /// WARNING: This is destructive and cannot be undone!
    #[arg(long)]
    reset_db: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

// ============================================================================
// Configuration
// ============================================================================

/// Load the config file and apply command-line overrides.
fn load_config(args: &CliArgs) -> Result<MonitorConfig> {
    let mut cfg = match &args.config {
        Some(path) => MonitorConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => MonitorConfig::load(),
    };

    if let Some(host) = &args.host {
        cfg.broker.host = host.clone();
    }
    if let Some(port) = args.port {
        cfg.broker.port = port;
    }
    if let Some(topic) = &args.topic {
        cfg.broker.topic = topic.clone();
    }
    if let Some(addr) = &args.addr {
        cfg.server.addr = addr.clone();
    }
    if let Some(db) = &args.db {
        cfg.storage.db_path = db.clone();
    }
    if args.persist {
        cfg.storage.persist_enabled = true;
    }
    if args.no_connect {
        cfg.broker.auto_connect = false;
    }

    cfg.validate().context("Invalid configuration")?;
    Ok(cfg)
}

// ============================================================================
// Database Reset
// ============================================================================

/// Remove the database file and its WAL/SHM companions.
fn reset_database(db_path: &Path) -> Result<()> {
    warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    warn!("  --reset-db: DELETING PERSISTED CYCLES AND RAW FRAMES");
    warn!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for suffix in ["", "-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        let path = PathBuf::from(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            warn!("  Removed {}", path.display());
        }
    }
    Ok(())
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    Dispatch,
    ConnectionWatch,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::Dispatch => write!(f, "Dispatch"),
            TaskName::ConnectionWatch => write!(f, "ConnectionWatch"),
        }
    }
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    state: MonitorState,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, create_app(state))
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the remaining tasks observe the cancellation and finish.
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!("🔒 Supervisor: Task {} stopped", task_name);
        }
    }

    Ok(())
}

// ============================================================================
// Ingestion Startup
// ============================================================================

/// Start the replay source or connect to the configured broker.
fn start_ingest(args: &CliArgs, cfg: &MonitorConfig, ingest: &IngestController) -> Result<()> {
    if let Some(path) = &args.replay {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture {}", path.display()))?;
        let mut source = ReplaySource::from_capture(&text)
            .with_context(|| format!("Malformed capture {}", path.display()))?
            .with_target("replay", path.display().to_string());
        if args.replay_interval_ms > 0 {
            source = source.with_pacing(Duration::from_millis(args.replay_interval_ms));
        }
        info!("📥 Input: replay of {} frames from {}", source.remaining().saturating_sub(1), path.display());
        ingest.start(source).context("Failed to start replay")?;
        return Ok(());
    }

    if !cfg.broker.auto_connect {
        info!("📥 Input: waiting for POST /api/connection");
        return Ok(());
    }

    let target = BrokerTarget::new(cfg.broker.host.clone(), cfg.broker.port, cfg.broker.topic.clone());
    info!("📥 Input: MQTT {} topic '{}'", target.address(), target.topic);
    // Broker trouble is reported through the connection status, not fatal.
    if let Err(e) = ingest.connect(target) {
        warn!("Initial connect failed: {}", e);
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    config::init(load_config(&args)?);
    let cfg = config::get();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  GIS PD Monitor");
    info!("  Partial-discharge online monitoring");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "   Windows: PRPD {} cycles | PRPS {} cycles | queue {}",
        cfg.windows.accumulation_cycles, cfg.windows.surface_cycles, cfg.windows.queue_capacity
    );

    // Reset DB check, before the pool opens the file
    if args.reset_db {
        reset_database(&cfg.storage.db_path)?;
    }

    info!("💾 Opening cycle log at {}", cfg.storage.db_path.display());
    let log = CycleLog::open(&cfg.storage.db_path)
        .await
        .context("Failed to open cycle log")?;
    info!(
        "✓ Cycle log ready (persistence {})",
        if cfg.storage.persist_enabled { "on" } else { "off" }
    );

    let queue = IngestQueue::new(cfg.windows.queue_capacity);
    let (raw_tx, raw_rx) = crossbeam_channel::bounded(cfg.storage.raw_channel_capacity);
    let (shared, frame_tx) = SharedState::new(
        cfg.windows.accumulation_cycles,
        cfg.windows.surface_cycles,
        cfg.storage.persist_enabled,
    );
    let ingest = Arc::new(IngestController::new(
        queue.clone(),
        raw_tx,
        IngestSettings::from(cfg),
    ));

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    info!("🌐 Starting HTTP server on {}...", cfg.server.addr);
    let listener = tokio::net::TcpListener::bind(&cfg.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", cfg.server.addr))?;
    info!("✓ HTTP server listening on {}", cfg.server.addr);
    info!("🎯 Live channel at: ws://{}/ws", cfg.server.addr);

    info!("🔒 Supervisor: Initializing task monitoring");
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task 1: HTTP Server
    let state = MonitorState::new(
        shared.clone(),
        log.clone(),
        queue.clone(),
        Arc::clone(&ingest),
        cfg,
    );
    spawn_http_server(&mut task_set, listener, state, cancel_token.clone());

    // Task 2: Dispatch (queue -> windows -> cycle log, render ticks)
    let timing = DispatchTiming {
        drain: cfg.dispatch.drain_interval(),
        render: cfg.dispatch.render_interval(),
        status: cfg.dispatch.status_interval(),
    };
    let dispatch = DispatchLoop::new(
        queue,
        raw_rx,
        shared,
        log.clone(),
        frame_tx,
        cancel_token.clone(),
    )
    .with_timing(timing);
    task_set.spawn(async move {
        info!("[Dispatch] Task starting");
        let _stats = dispatch.run().await;
        Ok(TaskName::Dispatch)
    });

    // Task 3: log broker connection changes
    let mut status_rx = ingest.subscribe_status();
    let watch_token = cancel_token.clone();
    task_set.spawn(async move {
        loop {
            tokio::select! {
                _ = watch_token.cancelled() => break,
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = status_rx.borrow_and_update().clone();
                    if status.connected {
                        info!("🔌 [Connection] {}", status.message);
                    } else {
                        warn!("🔌 [Connection] {}", status.message);
                    }
                }
            }
        }
        Ok(TaskName::ConnectionWatch)
    });

    // Ingestion runs on its own thread; failures here are reported, not fatal
    {
        let ingest = Arc::clone(&ingest);
        let replay = args.replay.is_some();
        let started = tokio::task::spawn_blocking(move || start_ingest(&args, cfg, &ingest)).await;
        match started {
            Ok(Ok(())) => {}
            Ok(Err(e)) if replay => {
                cancel_token.cancel();
                return Err(e);
            }
            Ok(Err(e)) => warn!("Ingestion not started: {:#}", e),
            Err(e) => warn!("Ingestion startup task failed: {}", e),
        }
    }

    let result = run_supervisor(&mut task_set, cancel_token).await;

    // Bounded stop of the ingest thread, then flush the log
    let stopper = Arc::clone(&ingest);
    if let Err(e) = tokio::task::spawn_blocking(move || stopper.disconnect()).await {
        warn!("Ingest stop task failed: {}", e);
    }
    log.close().await;

    info!("✓ GIS PD Monitor shutdown complete");
    result
}
