use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use unitmon::*;

/// Monitor systemd user units and send metrics to Telegraf.
#[derive(Parser)]
#[command(name = "unitmon", about = "systemd user unit monitor")]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

fn init_logging(logging: &config::LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };
    match logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_timer(LocalTimer)
            .with_env_filter(filter)
            .init(),
    }
}

async fn shutdown_signal() {
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let app_config = config::AppConfig::load(args.config.as_deref())?;
    init_logging(&app_config.logging, args.verbose);

    tracing::info!("Starting systemd unit monitor");

    let identity = models::ProcessIdentity::capture();
    let unit_filter =
        filter::UnitFilter::parse(&app_config.filters.include, &app_config.filters.exclude);
    let emitter = emitter::TelegrafEmitter::new(
        &app_config.telegraf.socket_path,
        app_config.telegraf.measurement.clone(),
        identity,
    );

    // Bus connection failure at startup is the one fatal error.
    let bus = Arc::new(systemd_repo::SystemdRepo::connect().await?);

    let monitor = monitor::Monitor::new(
        bus,
        unit_filter,
        emitter,
        Duration::from_secs(app_config.monitoring.poll_interval),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let mut monitor_handle = tokio::spawn(monitor.run(shutdown_rx));

    tokio::select! {
        result = &mut monitor_handle => {
            result??;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            monitor_handle.await??;
        }
    }

    Ok(())
}
