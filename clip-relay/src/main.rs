//! cliprelay binary entry point.
//!
//! Usage:
//! ```bash
//! cliprelay --config relay.toml
//! cliprelay --bind 127.0.0.1:9000
//! cliprelay --help
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use cliprelay::cleanup::spawn_cleanup_task;
use cliprelay::config::{Config, LoggingConfig};
use cliprelay::server::{self, ClipRelay};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Zero-knowledge WebSocket relay for encrypted clipboard sharing.
#[derive(Parser, Debug)]
#[command(name = "cliprelay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "relay.toml")]
    config: PathBuf,

    /// Override `server.bind_address`
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, loaded) = if cli.config.exists() {
        (Config::from_file(&cli.config)?, true)
    } else {
        (Config::default(), false)
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    config.validate()?;

    init_tracing(&config.logging);
    if loaded {
        tracing::info!("Loaded configuration from {}", cli.config.display());
    } else {
        tracing::warn!(
            "Config file {} not found, using defaults",
            cli.config.display()
        );
    }

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;

    tracing::info!("cliprelay v{} starting", env!("CARGO_PKG_VERSION"));

    let cleanup_interval = config.limits.cleanup_interval_secs;
    let relay = Arc::new(ClipRelay::new(config));
    let cleanup = spawn_cleanup_task(relay.rate_limits().clone(), cleanup_interval);

    server::run(relay, listener, shutdown_signal())
        .await
        .context("server error")?;

    cleanup.abort();
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
