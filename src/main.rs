//! Main entry point for the zipstream server.
//!
//! Parses the command line, sets up logging and serves archives until
//! Ctrl-C.

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use zipstream::{Cli, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_cli(&cli)?;

    init_logging(config.logging);

    if !zipstream::config::is_dir(&config.root).await {
        // requests will all be 404 until the folder shows up
        warn!(root = %config.root.display(), "archive folder does not exist");
    }
    info!(
        root = %config.root.display(),
        delay = ?config.delay,
        chunk_size = config.chunk_size,
        "starting archive server"
    );

    let listener = TcpListener::bind(config.listen).await?;
    zipstream::server::serve(listener, config, shutdown_signal()).await
}

/// `RUST_LOG` wins; otherwise `--logging` selects info over warn.
fn init_logging(enabled: bool) {
    let default = if enabled { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
