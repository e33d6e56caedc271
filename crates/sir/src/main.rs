//! SIR - simple influx relay
//!
//! # Usage
//!
//! ```bash
//! # Run with the default config file (sir.conf)
//! sir
//!
//! # Run with an explicit config
//! sir --config configs/sir.toml
//!
//! # Verbose logging
//! sir --log-level debug
//! ```
//!
//! A missing config file is not fatal: the relay logs a warning and runs
//! from a built-in default pointing at a local downstream on port 8086.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use sir_backend::Fleet;
use sir_config::Config;
use sir_listener::HttpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Built-in fallback used when the config file does not exist
const DEFAULT_CONFIG: &str = r#"
[listener]
addr = "127.0.0.1:8186"

[internal]
enable = true
frequency = "60s"

[server.local]
server_name = "localhost"
port = 8086
timeout = "40s"
"#;

/// SIR - HTTP relay for time-series line-protocol writes
#[derive(Parser, Debug)]
#[command(name = "sir")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "sir.conf")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = load_config(&cli.config)?;
    if config.server.is_empty() {
        bail!("no backend endpoints configured");
    }

    let fleet = Arc::new(Fleet::from_config(&config).context("building backend fleet")?);
    let listener = HttpListener::new(config.listener.clone(), Arc::clone(&fleet) as Arc<dyn sir_listener::Backend>);

    let fleet_task = {
        let fleet = Arc::clone(&fleet);
        tokio::spawn(async move { fleet.run().await })
    };

    let shutdown = CancellationToken::new();
    let mut listener_task = tokio::spawn(listener.run(shutdown.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, stopping");
        }
        result = &mut listener_task => {
            fleet.stop();
            let _ = fleet_task.await;
            result.context("listener task panicked")??;
            bail!("front door exited unexpectedly");
        }
    }

    // Stop the front door first so no new batches arrive while the fleet
    // drains and persists its buffers.
    shutdown.cancel();
    listener_task.await.context("listener task panicked")??;

    fleet.stop();
    let _ = fleet_task.await;

    tracing::info!("shutdown complete");
    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        return Config::from_file(path).with_context(|| format!("loading {}", path.display()));
    }
    tracing::warn!(
        path = %path.display(),
        "config file not found, using built-in defaults"
    );
    DEFAULT_CONFIG
        .parse()
        .context("parsing built-in default config")
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log level")?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    Ok(())
}
