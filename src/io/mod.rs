mod process;

pub use process::{ProcessSource, ZipCommand};

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ArchiveError;

/// Trait for a running producer of archive bytes
#[async_trait]
pub trait ArchiveSource: Send {
    /// Read the next block of output, or `None` once the producer is done
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, ArchiveError>;

    /// Stop the producer and release its handles. Calling it again is a no-op.
    async fn terminate(&mut self) -> Result<(), ArchiveError>;
}

/// Trait for starting an [`ArchiveSource`] over a directory
pub trait Archiver: Send + Sync {
    fn start(&self, dir: &Path) -> Result<Box<dyn ArchiveSource>, ArchiveError>;
}
