//! Archive entry model.

use std::path::{Path, PathBuf};

/// One entry of an archive, as read back by [`read_archive`](super::read_archive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntry {
    /// A directory.
    Directory { path: PathBuf, mode: u32, mtime: u64 },
    /// A regular file stored with its full content.
    File {
        path: PathBuf,
        data: Vec<u8>,
        mode: u32,
        mtime: u64,
    },
    /// A large file stored only as its declared logical size.
    SparsePlaceholder {
        path: PathBuf,
        declared_size: u64,
        mode: u32,
        mtime: u64,
    },
}

impl ArchiveEntry {
    /// Path relative to the archive root.
    pub fn path(&self) -> &Path {
        match self {
            ArchiveEntry::Directory { path, .. }
            | ArchiveEntry::File { path, .. }
            | ArchiveEntry::SparsePlaceholder { path, .. } => path,
        }
    }

    /// Permission bits recorded for the entry.
    pub fn mode(&self) -> u32 {
        match self {
            ArchiveEntry::Directory { mode, .. }
            | ArchiveEntry::File { mode, .. }
            | ArchiveEntry::SparsePlaceholder { mode, .. } => *mode,
        }
    }

    /// Modification time (Unix epoch seconds).
    pub fn mtime(&self) -> u64 {
        match self {
            ArchiveEntry::Directory { mtime, .. }
            | ArchiveEntry::File { mtime, .. }
            | ArchiveEntry::SparsePlaceholder { mtime, .. } => *mtime,
        }
    }

    /// Size the entry has once restored (0 for directories).
    pub fn logical_size(&self) -> u64 {
        match self {
            ArchiveEntry::Directory { .. } => 0,
            ArchiveEntry::File { data, .. } => data.len() as u64,
            ArchiveEntry::SparsePlaceholder { declared_size, .. } => *declared_size,
        }
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, ArchiveEntry::Directory { .. })
    }

    /// Check if this is a sparse placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ArchiveEntry::SparsePlaceholder { .. })
    }
}
