//! thermolog service - sensor sampler and HTTP API.
//!
//! Run with: `cargo run -p thermolog-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use thermolog_service::{AppState, Clock, Config, Sampler, SensorKind, SystemClock, api, sensor};
use thermolog_store::{ReadingLog, cutoff_before};

/// thermolog service - sensor sampler and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "thermolog-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Reading log path (overrides config).
    #[arg(short, long, global = true)]
    log: Option<PathBuf>,

    /// Disable the background sampler (API only mode).
    #[arg(long, global = true)]
    no_sampler: bool,

    /// Use a simulated sensor instead of the configured one.
    #[arg(long, global = true)]
    mock_sensor: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Compact the reading log once and exit.
    Compact {
        /// Drop readings older than this epoch timestamp
        /// (default: now minus the retention window).
        #[arg(long)]
        cutoff: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thermolog_service=info".parse()?)
                .add_directive("thermolog_store=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::Compact { cutoff }) => compact_once(&config, cutoff).await,
        Some(Command::Run) | None => run_server(&args, config).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(path) = &args.log {
        config.storage.path = path.clone();
    }
    if args.mock_sensor {
        config.sensor.kind = SensorKind::Mock;
    }

    config.validate()?;
    Ok(config)
}

async fn compact_once(config: &Config, cutoff: Option<i64>) -> anyhow::Result<()> {
    let cutoff = match cutoff {
        Some(cutoff) => cutoff,
        None => {
            let now = SystemClock::new(config.clock.epoch_floor)
                .now()
                .context("system clock is not synchronized; pass --cutoff explicitly")?;
            cutoff_before(now, config.retention.window())
        }
    };

    let log = ReadingLog::new(&config.storage.path);
    let _writer = log
        .lock_writer()
        .context("failed to take the writer lock (is the service running?)")?;
    info!("Compacting {:?} (cutoff {})", log.path(), cutoff);
    let stats = tokio::task::spawn_blocking(move || log.compact(cutoff)).await??;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn run_server(args: &Args, config: Config) -> anyhow::Result<()> {
    // A log that cannot be created is not fatal: queries report no data and
    // appends are retried on every sample.
    info!("Opening reading log at {:?}", config.storage.path);
    let log = match ReadingLog::open(&config.storage.path) {
        Ok(log) => log,
        Err(e) => {
            error!("Storage unavailable: {}", e);
            ReadingLog::new(&config.storage.path)
        }
    };

    // Held for the life of the process so a one-off `compact` cannot race the
    // sampler. Without storage there is nothing to protect yet.
    let _writer = match log.lock_writer() {
        Ok(lock) => Some(lock),
        Err(e @ thermolog_store::Error::Locked { .. }) => {
            return Err(e).context("another thermolog process is writing this log");
        }
        Err(e) => {
            warn!("Running without writer lock: {}", e);
            None
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.clock.epoch_floor));
    if !clock.is_synced() {
        warn!("Wall clock not synchronized yet; readings are held back until it is");
    }

    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::new(log, config, clock);

    let sampler = if args.no_sampler {
        info!("Background sampler disabled");
        None
    } else {
        let provider = sensor::from_config(&state.config.sensor);
        Some(Sampler::new(Arc::clone(&state), provider).start())
    };

    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::clone(&state));

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
            shutdown_state.sampler.signal_stop();
        })
        .await?;

    if let Some(handle) = sampler
        && let Err(e) = handle.await
    {
        warn!("Sampler task ended abnormally: {}", e);
    }

    Ok(())
}
