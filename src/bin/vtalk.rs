//! vtalk: streaming conversation server for animated character clients.
//!
//! Loads the TOML configuration, starts the WebSocket server and runs until
//! Ctrl+C. Logs go to stderr and, when `logging.directory` is set, to a
//! daily-rotated file as well.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use vtalk::config::AppConfig;
use vtalk::pipeline::TurnSequencer;
use vtalk::server::ChatServer;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "vtalk=info";

/// Streaming conversation server for animated character clients.
#[derive(Parser)]
#[command(name = "vtalk", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "VTALK_CONFIG")]
    config: Option<PathBuf>,

    /// Override the bind address.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port (0 = auto-assign).
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _log_guard = init_tracing(config.logging.directory.as_deref());

    info!("vtalk v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(config);
    let sequencer = Arc::new(TurnSequencer::from_config(&config)?);
    let mut server = ChatServer::start(Arc::clone(&config), sequencer).await?;

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl+C, shutting down...");
    server.shutdown();
    server.wait().await;

    info!("vtalk shut down cleanly");
    Ok(())
}

/// Load the config file (explicit, default location, or built-in defaults)
/// and apply command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => {
            let default_path = AppConfig::default_config_path();
            if default_path.is_file() {
                AppConfig::from_file(&default_path)?
            } else {
                AppConfig::default()
            }
        }
    };
    if let Some(host) = &cli.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.prepare()?;
    Ok(config)
}

/// Initialise tracing. The returned guard flushes the log file on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vtalk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .init();
            None
        }
    }
}
