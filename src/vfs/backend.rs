//! Operation set a mount driver calls into.

use crate::error::Result;
use crate::vfs::types::{FileAttr, OpenMode};

/// POSIX-like callbacks over a mounted container.
///
/// Paths are relative to the mount root (`/` is the root itself). Errors map
/// to errno values through [`crate::Error::errno`]. A session's callbacks are
/// expected to be driven by one caller at a time.
pub trait FilesystemBackend {
    fn getattr(&self, path: &str) -> Result<FileAttr>;

    /// Entry names of a directory, starting with `.` and `..`.
    fn readdir(&self, path: &str) -> Result<Vec<String>>;

    /// Open an existing file and return a handle.
    fn open(&mut self, path: &str, mode: OpenMode) -> Result<u64>;

    /// Create (or truncate) a file with permission bits `mode`.
    fn create(&mut self, path: &str, mode: u32) -> Result<u64>;

    /// Read up to `size` bytes at `offset`. Short reads mean end of file.
    fn read(&mut self, fh: u64, offset: u64, size: usize) -> Result<Vec<u8>>;

    /// Write `data` at `offset`; returns the number of bytes written.
    fn write(&mut self, fh: u64, offset: u64, data: &[u8]) -> Result<usize>;

    fn truncate(&mut self, path: &str, length: u64) -> Result<()>;

    fn flush(&mut self, fh: u64) -> Result<()>;

    /// Close a handle.
    fn release(&mut self, fh: u64) -> Result<()>;

    fn unlink(&mut self, path: &str) -> Result<()>;

    fn mkdir(&mut self, path: &str, mode: u32) -> Result<()>;

    fn rmdir(&mut self, path: &str) -> Result<()>;

    fn rename(&mut self, from: &str, to: &str) -> Result<()>;

    /// Persist and tear down. Safe to call more than once.
    fn destroy(&mut self) -> Result<()>;
}
