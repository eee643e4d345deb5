//! Inspection of finished ZIP archives.
//!
//! The server never builds archives itself; the `zip` program does. This
//! module reads what came out of it: the entry list from the central
//! directory and the contents of individual entries.
//!
//! - [`structures`]: on-disk records (EOCD, ZIP64 records, entries)
//! - [`reader`]: [`ArchiveIndex`], parsing and extraction over a byte slice
//!
//! Supported: STORED and DEFLATE entries, ZIP64 sizes and offsets, archive
//! comments. Not supported: encryption, multi-disk archives.

mod reader;
mod structures;

pub use reader::ArchiveIndex;
pub use structures::{CompressionMethod, ZipEntry};
