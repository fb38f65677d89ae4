//! Veil Daemon - runs the operator risk engine
//!
//! The daemon provides:
//! - The tick loop that scores risk and steers the evasion strategy
//! - Background protections dispatched to the actuator
//! - Optional replay of recorded observations
//! - Status change logging

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use veil_engine::{EngineStatus, RiskEngine, SystemClock};
use veil_types::{OperatingProfile, Protection};

mod actuator;
mod config;
mod error;
mod replay;

use actuator::LoggingActuator;
use config::DaemonConfig;
use error::{DaemonError, DaemonResult};

/// Veil Daemon CLI
#[derive(Parser)]
#[command(name = "veild")]
#[command(about = "Veil Daemon - operator risk assessment and evasion policy", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "VEIL_CONFIG")]
    config: Option<String>,

    /// Operating profile
    #[arg(short, long, env = "VEIL_PROFILE", default_value = "balanced")]
    profile: OperatingProfile,

    /// Log level
    #[arg(long, env = "VEIL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "VEIL_LOG_JSON")]
    json: bool,

    /// Replay observations from a JSON Lines file
    #[arg(long)]
    replay: Option<String>,

    /// Replay speed factor
    #[arg(long)]
    speed: Option<f64>,

    /// Protections to enable, comma separated
    #[arg(long, value_delimiter = ',')]
    enable: Vec<Protection>,

    /// Protections to disable, comma separated
    #[arg(long, value_delimiter = ',')]
    disable: Vec<Protection>,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref(), cli.profile)?;

    // Override with CLI args
    if let Some(level) = cli.log_level.clone() {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;
    if let Some(path) = cli.replay.clone() {
        config.replay.path = Some(path);
    }
    if let Some(speed) = cli.speed {
        config.replay.speed = speed;
    }
    for protection in &cli.enable {
        config.protections.set(*protection, true);
    }
    for protection in &cli.disable {
        config.protections.set(*protection, false);
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        profile = %config.profile,
        tick_ms = config.engine.tick_interval_ms,
        "Starting veild"
    );

    let engine = Arc::new(RiskEngine::new(
        config.engine.clone(),
        Arc::new(LoggingActuator),
        Arc::new(SystemClock),
    )?);

    for protection in Protection::ALL {
        engine.set_toggle(protection, config.protections.is_enabled(protection));
    }

    let mut subscription = engine.subscribe_status();
    let watcher = tokio::spawn(async move {
        let mut last: Option<Arc<EngineStatus>> = None;
        while let Some(status) = subscription.receiver.recv().await {
            log_status_change(last.as_deref(), &status);
            last = Some(status);
        }
    });

    let handle = engine.start();

    let replay = config.replay.path.clone().map(|path| {
        let engine = engine.clone();
        let speed = config.replay.speed;
        tokio::spawn(async move {
            let (records, skipped) = replay::load(Path::new(&path)).await?;
            if skipped > 0 {
                warn!(skipped, path = %path, "Replay file had unparseable lines");
            }
            replay::run(engine, records, speed).await
        })
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received");
        }
        _ = wait_for_exit(&handle) => {
            warn!("Engine loop exited");
        }
    }

    if let Some(replay) = replay {
        replay.abort();
    }
    watcher.abort();

    handle.shutdown().await.map_err(DaemonError::from)?;
    info!("veild stopped");
    Ok(())
}

/// Resolve once the engine loop has stopped on its own.
async fn wait_for_exit(handle: &veil_engine::EngineHandle) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(500));
    while !handle.is_finished() {
        interval.tick().await;
    }
}

fn log_status_change(previous: Option<&EngineStatus>, current: &EngineStatus) {
    let level = current.assessment.risk_level;
    let strategy = current.assessment.strategy;

    let changed = previous.map_or(true, |p| {
        p.assessment.risk_level != level || p.assessment.strategy != strategy
    });
    if changed {
        info!(
            score = current.assessment.risk_score,
            level = %level,
            strategy = %strategy,
            trend = %current.assessment.trend,
            "Risk status changed"
        );
    }

    if current.degraded && !previous.is_some_and(|p| p.degraded) {
        warn!(version = current.version, "Engine status degraded");
    }
}
