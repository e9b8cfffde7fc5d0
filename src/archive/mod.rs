//! Archive codec: the unencrypted tree serialization carried inside a container.
//!
//! Archives are tar streams written in deterministic (sorted) traversal
//! order. Files above the sparse threshold may be replaced by zero-length
//! placeholders whose logical size travels in a `ZIL_SPARSE_SIZE` pax record.

mod builder;
mod entry;
mod extract;
mod reader;
mod sparse;

pub use builder::{build_archive, ArchiveBuilder, BuildStats};
pub use entry::ArchiveEntry;
pub use extract::{extract_archive, resolve_within, ExtractReport};
pub use reader::read_archive;
pub use sparse::{detect as detect_sparse, SparseCapability, TruncateSparse, ZeroFillSparse};

use crate::error::Error;

/// Wrap a framing error from the tar layer.
pub(crate) fn malformed(e: std::io::Error) -> Error {
    Error::Format(format!("malformed archive: {}", e))
}
