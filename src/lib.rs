//! # zipstream
//!
//! An HTTP service that hands out directories as zip archives, streamed to
//! the client while the archive is still being built.
//!
//! Each download runs the `zip` program over the requested directory and
//! relays its stdout into a chunked HTTP response. Nothing is written to disk
//! and nothing is buffered beyond a single chunk.
//!
//! ## Features
//!
//! - Archives start flowing as soon as `zip` produces output
//! - A client that disconnects has its `zip` process killed promptly
//! - Optional per-chunk delay to simulate slow networks
//! - Archive identifiers are allow-listed and never pass through a shell
//!
//! ## Example
//!
//! ```no_run
//! use tokio::net::TcpListener;
//! use zipstream::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::with_root("test_photos");
//!     let listener = TcpListener::bind(config.listen).await?;
//!
//!     zipstream::server::serve(listener, config, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod response;
pub mod server;
pub mod zip;

pub use cli::Cli;
pub use config::Config;
pub use error::{ArchiveError, Interruption};
pub use io::{ArchiveSource, Archiver, ProcessSource, ZipCommand};
pub use response::ResponseStream;
pub use server::{AppState, build_router};
pub use zip::{ArchiveIndex, ZipEntry};
