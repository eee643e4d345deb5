//! HTTP surface.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Static index page |
//! | GET | `/archive/{archive_hash}/` | Zip of the directory, streamed while it is built |

pub mod archive;
mod index;

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::config::Config;
use crate::io::{Archiver, ZipCommand};

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub archiver: Arc<dyn Archiver>,
    /// Flips to `true` when the server starts shutting down
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// State backed by the configured `zip` program
    pub fn new(config: Config, shutdown: watch::Receiver<bool>) -> Self {
        let archiver = ZipCommand::new(config.zip_program.clone(), config.chunk_size);
        Self::with_archiver(config, Arc::new(archiver), shutdown)
    }

    pub fn with_archiver(
        config: Config,
        archiver: Arc<dyn Archiver>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            archiver,
            shutdown,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::handle_index_page))
        .route("/archive/{archive_hash}/", get(archive::handle_archive))
        .with_state(state)
}

/// Serve `state` on `listener` until `signal` resolves.
///
/// When the signal fires, in-flight archive streams are told to stop, which
/// kills their archivers and lets the connections drain.
pub async fn serve<F>(listener: TcpListener, config: Config, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let router = build_router(AppState::new(config, shutdown_rx));

    info!(addr = %listener.local_addr()?, "archive server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("archive server stopped");
    Ok(())
}
