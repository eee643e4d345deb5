//! Immutable startup configuration.
//!
//! Built once from the command line and shared read-only with every request
//! through the router state.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::cli::Cli;
use crate::error::ArchiveError;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Longest archive identifier accepted in a URL
pub const MAX_IDENTIFIER_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory archive identifiers are resolved under
    pub root: PathBuf,
    /// Pause before every forwarded chunk
    pub delay: Option<Duration>,
    pub logging: bool,
    pub index: PathBuf,
    pub listen: SocketAddr,
    pub chunk_size: usize,
    pub zip_program: PathBuf,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let delay = match cli.delay {
            None => None,
            Some(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(delay) => Some(delay),
                Err(_) => bail!("delay must be a non-negative number of seconds, got {secs}"),
            },
        };

        if cli.chunk_size == 0 {
            bail!("chunk size must be greater than zero");
        }

        Ok(Self {
            root: cli.folder.clone(),
            delay: delay.filter(|d| !d.is_zero()),
            logging: cli.logging,
            index: cli.index.clone(),
            listen: SocketAddr::new(cli.host, cli.port),
            chunk_size: cli.chunk_size,
            zip_program: cli.zip_program.clone(),
        })
    }

    /// Configuration rooted at `root` with every other option at its default
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            delay: None,
            logging: false,
            index: PathBuf::from("index.html"),
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            chunk_size: DEFAULT_CHUNK_SIZE,
            zip_program: PathBuf::from("zip"),
        }
    }

    /// Map an archive identifier to an existing directory under the root.
    ///
    /// Identifiers are restricted to ASCII letters, digits, `_` and `-`, so
    /// nothing that reaches the filesystem can climb out of the root.
    pub async fn resolve_archive(&self, identifier: &str) -> Result<PathBuf, ArchiveError> {
        if !is_valid_identifier(identifier) {
            return Err(ArchiveError::InvalidIdentifier(identifier.to_string()));
        }

        let path = self.root.join(identifier);
        if !is_dir(&path).await {
            return Err(ArchiveError::ResourceNotFound(identifier.to_string()));
        }

        Ok(path)
    }
}

pub fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier.len() <= MAX_IDENTIFIER_LEN
        && identifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Whether `path` is an existing directory, checked off the runtime threads
pub async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
