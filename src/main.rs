//! engagement-engine - external-video engagement estimation service
//!
//! Ingests outbound click / return events into a day-partitioned log and
//! serves completion-rate estimates over rolling windows.
//!
//! # Usage
//!
//! ```bash
//! # Run the HTTP service (default)
//! engagement-engine serve --addr 0.0.0.0:8080
//!
//! # One-off queries against the local event log
//! engagement-engine stats --range 30d
//! engagement-engine estimates --range 7d --platform short-form
//!
//! # Record a batch from a file
//! engagement-engine ingest --file batch.json
//! ```
//!
//! # Environment Variables
//!
//! - `ENGAGEMENT_CONFIG`: Path to the TOML config (default: ./engagement.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use engagement_engine::api::{create_app, ApiState};
use engagement_engine::clock::{Clock, SystemClock};
use engagement_engine::config::{defaults, EngineConfig};
use engagement_engine::storage::{LogStore, ProcessLock};
use engagement_engine::types::{EstimateFilters, Platform, StatsRange};
use engagement_engine::{Aggregator, IngestionService};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "engagement-engine")]
#[command(about = "External-video engagement estimation service")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file
    #[arg(long, global = true, value_name = "PATH", env = "ENGAGEMENT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the HTTP ingestion and query service
    Serve {
        /// Override the server address
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Print click/return statistics as JSON
    Stats {
        #[arg(long, default_value = "7d")]
        range: StatsRange,
    },

    /// Print completion estimates as JSON
    Estimates {
        #[arg(long, default_value = "7d")]
        range: StatsRange,
        #[arg(long)]
        video_id: Option<String>,
        #[arg(long)]
        platform: Option<Platform>,
    },

    /// Record a JSON batch of `{type, data}` entries from a file
    Ingest {
        #[arg(long)]
        file: PathBuf,
    },
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    LogFlusher,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::LogFlusher => write!(f, "LogFlusher"),
        }
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::load(),
    };
    if let Some(dir) = &args.data_dir {
        config.storage.data_dir = dir.clone();
    }
    Ok(config)
}

/// Services shared by every subcommand.
struct Services {
    _process_lock: ProcessLock,
    log: LogStore,
    ingest: IngestionService,
    aggregator: Aggregator,
}

fn init_services(config: &EngineConfig) -> Result<Services> {
    let data_dir = &config.storage.data_dir;

    let _process_lock = ProcessLock::acquire(data_dir).context("Failed to acquire process lock")?;

    let db_path = config.storage.event_db_path();
    let log = LogStore::open_sled(&db_path)
        .with_context(|| format!("Failed to open event log at {}", db_path.display()))?;
    info!(path = %db_path.display(), segments = log.list_segments().len(), "Event log ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ingest = IngestionService::new(log.clone(), clock.clone());
    let aggregator = Aggregator::new(log.clone(), clock, config.aggregation.clone());

    Ok(Services {
        _process_lock,
        log,
        ingest,
        aggregator,
    })
}

// ============================================================================
// Server Tasks
// ============================================================================

fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
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

fn spawn_log_flusher(
    task_set: &mut JoinSet<Result<TaskName>>,
    log: LogStore,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[LogFlusher] Task starting");
        let mut interval =
            tokio::time::interval(Duration::from_secs(defaults::LOG_FLUSH_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = interval.tick() => {
                    let log = log.clone();
                    match tokio::task::spawn_blocking(move || log.flush()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!("[LogFlusher] Flush failed: {}", e),
                        Err(e) => warn!("[LogFlusher] Flush task failed: {}", e),
                    }
                }
            }
        }

        log.flush().context("Final event log flush failed")?;
        info!("[LogFlusher] Final flush complete");
        Ok(TaskName::LogFlusher)
    });
}

/// Monitor tasks, cancel everything on the first failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    loop {
        match task_set.join_next().await {
            Some(Ok(Ok(task_name))) => {
                info!("Supervisor: task {} completed", task_name);
                cancel_token.cancel();
            }
            Some(Ok(Err(e))) => {
                error!("Supervisor: task failed with error: {}", e);
                cancel_token.cancel();
                return Err(e);
            }
            Some(Err(e)) => {
                error!("Supervisor: task panicked: {}", e);
                cancel_token.cancel();
                return Err(anyhow::anyhow!("Task panicked: {}", e));
            }
            None => {
                info!("Supervisor: all tasks completed");
                break;
            }
        }
    }

    Ok(())
}

async fn run_server(config: EngineConfig, addr_override: Option<String>) -> Result<()> {
    let services = init_services(&config)?;
    let addr = addr_override.unwrap_or_else(|| config.server.addr.clone());

    let state = ApiState::new(services.ingest.clone(), services.aggregator.clone());
    let app = create_app(state, &config.server);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(%addr, backend = services.log.backend_name(), "HTTP server listening");

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    spawn_log_flusher(&mut task_set, services.log.clone(), cancel_token.clone());

    run_supervisor(&mut task_set, cancel_token).await
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = load_config(&args)?;

    match args.command {
        None => run_server(config, None).await?,
        Some(SubCommand::Serve { addr }) => run_server(config, addr).await?,
        Some(SubCommand::Stats { range }) => {
            let services = init_services(&config)?;
            print_json(&services.aggregator.get_external_video_stats(range))?;
        }
        Some(SubCommand::Estimates {
            range,
            video_id,
            platform,
        }) => {
            let services = init_services(&config)?;
            let filters = EstimateFilters { video_id, platform };
            print_json(&services.aggregator.get_completion_estimates(range, &filters))?;
        }
        Some(SubCommand::Ingest { file }) => {
            let services = init_services(&config)?;
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let entries: Vec<serde_json::Value> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array", file.display()))?;
            let results = services.ingest.record_batch(entries);
            services.log.flush().context("Failed to flush event log")?;
            print_json(&results)?;
        }
    }

    info!("engagement-engine shutdown complete");
    Ok(())
}
