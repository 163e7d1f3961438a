//! Sockswatch - Passive SOCKS5 credential auditor
//!
//! This is the main entry point for the Sockswatch application.

use anyhow::Result;
use clap::Parser;
use sockswatch::config::{load_config, Config};
use sockswatch::monitor::run_monitor;
use sockswatch::SockswatchError;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Sockswatch - Passive SOCKS5 session reconstruction and credential auditing
///
/// Every option can also be set through its `SOCKSWATCH_*` environment
/// variable; an explicit flag wins over the environment.
#[derive(Parser, Debug)]
#[command(name = "sockswatch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults are used when absent)
    #[arg(short, long, env = "SOCKSWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to capture on (overrides the configuration file)
    #[arg(short, long, env = "SOCKSWATCH_INTERFACE")]
    interface: Option<String>,

    /// Candidate proxy port, may be repeated (overrides the configuration file)
    #[arg(short, long = "port", env = "SOCKSWATCH_PORTS", value_delimiter = ',')]
    ports: Vec<u16>,

    /// Seconds between status lines (overrides the configuration file)
    #[arg(long, env = "SOCKSWATCH_STATUS_INTERVAL")]
    status_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "SOCKSWATCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SOCKSWATCH_JSON_LOG")]
    json_log: bool,
}

impl Args {
    /// Apply command line and environment overrides to `config`
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(interface) = &self.interface {
            config.capture.interface = Some(interface.clone());
        }
        if !self.ports.is_empty() {
            config.capture.ports = self.ports.clone();
        }
        if let Some(secs) = self.status_interval {
            config.status.interval_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };
    args.apply_overrides(&mut config);
    config.validate().map_err(SockswatchError::Config)?;

    info!("Sockswatch v{}", sockswatch::VERSION);
    info!("Report cooldown: {}s", config.engine.report_cooldown_secs);

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            info!("Received Ctrl+C, shutting down...");
                        }
                        _ = sigterm.recv() => {
                            info!("Received SIGTERM, shutting down...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to setup SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received Ctrl+C, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }

        let _ = shutdown_tx_clone.send(true);
    });

    // Run the monitor
    run_monitor(config, shutdown_rx).await
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
