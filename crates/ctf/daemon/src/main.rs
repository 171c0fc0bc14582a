//! ctfd - Flagline scoring daemon
//!
//! Serves the submission boundary over HTTP:
//! - flag submission with at-most-once awards
//! - per-user progress and history per event
//! - live progress and solver-count streams (SSE)

use clap::Parser;
use ctf_daemon::error::{DaemonError, DaemonResult};
use ctf_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Flagline daemon CLI
#[derive(Parser)]
#[command(name = "ctfd")]
#[command(about = "Flagline - CTF submission and scoring daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CTFD_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides the configuration file)
    #[arg(short, long, env = "CTFD_SERVER__LISTEN_ADDR")]
    listen: Option<String>,

    /// Challenge catalog JSON file (overrides the configuration file)
    #[arg(long, env = "CTFD_CATALOG__PATH")]
    catalog: Option<String>,

    /// Log level
    #[arg(long, env = "CTFD_LOGGING__LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "CTFD_LOGGING__JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(catalog) = cli.catalog {
        config.catalog.path = Some(catalog);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

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

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        "Starting ctfd"
    );

    let server = Server::new(config).await?;
    server.run().await
}
