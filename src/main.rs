//! kf2-manager entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kf2_manager::{control, firewall, DailySchedule, LogDir, ManagerConfig, Supervisor};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = cli::Cli::parse();

    let config = ManagerConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let logs = LogDir::new(&config.logs.dir).context("creating log directory")?;

    let file_appender = tracing_appender::rolling::daily(logs.root(), "manager.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kf2_manager=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "kf2-manager starting"
    );

    if cli.skip_firewall {
        info!("firewall setup skipped by flag");
    } else {
        firewall::apply(&config.firewall).await;
    }

    let schedule = DailySchedule::new(config.schedule.hour, config.schedule.minute, Local::now())
        .context("invalid schedule time")?;
    let tick = config.schedule.tick();
    let supervisor = Arc::new(Supervisor::new(config, logs));

    if cli.skip_initial_cycle {
        info!("initial maintenance cycle skipped by flag");
    } else {
        // Nothing is supervised yet, so a failure here is fatal to the
        // whole program.
        supervisor
            .reinit_all()
            .await
            .context("initial startup cycle failed")?;
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        control::wait_for_shutdown_signal().await;
        signal_token.cancel();
    });

    control::run(supervisor, schedule, tick, shutdown).await;
    info!("kf2-manager stopped");
    Ok(())
}
