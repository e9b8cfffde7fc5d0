//! Sparse-file capability used when restoring placeholders.

use crate::error::Result;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// Zero buffer size for the explicit fill fallback.
const ZERO_FILL_CHUNK: usize = 64 * 1024;

/// Platform capability for extending a file to a logical size.
///
/// Implementations must leave the file readable as all zeros between its
/// previous end and `size`; whether blocks are actually allocated is up to
/// the platform.
pub trait SparseCapability: Send + Sync {
    /// Flag a file as sparse, where the platform needs that up front.
    fn mark_sparse(&self, path: &Path) -> Result<()>;

    /// Set the file's length to `size`.
    fn truncate_to(&self, path: &Path, size: u64) -> Result<()>;

    /// Get the name of this capability (for logging).
    fn name(&self) -> &'static str;
}

/// Extends files with `set_len`, which leaves a hole on file systems that
/// support them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TruncateSparse;

impl SparseCapability for TruncateSparse {
    fn mark_sparse(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn truncate_to(&self, path: &Path, size: u64) -> Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(size)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "truncate"
    }
}

/// Writes real zero bytes. Same content, full disk footprint.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroFillSparse;

impl SparseCapability for ZeroFillSparse {
    fn mark_sparse(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn truncate_to(&self, path: &Path, size: u64) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(path)?;
        let current = file.metadata()?.len();
        if size <= current {
            file.set_len(size)?;
            return Ok(());
        }

        file.seek(SeekFrom::End(0))?;
        let zeros = vec![0u8; ZERO_FILL_CHUNK];
        let mut remaining = size - current;
        while remaining > 0 {
            let n = remaining.min(ZERO_FILL_CHUNK as u64) as usize;
            file.write_all(&zeros[..n])?;
            remaining -= n as u64;
        }
        file.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "zero-fill"
    }
}

/// Select the sparse capability for the current platform.
#[cfg(unix)]
pub fn detect() -> Arc<dyn SparseCapability> {
    Arc::new(TruncateSparse)
}

#[cfg(not(unix))]
pub fn detect() -> Arc<dyn SparseCapability> {
    Arc::new(ZeroFillSparse)
}
