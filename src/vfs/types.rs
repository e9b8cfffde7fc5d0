//! VFS types: file attributes and open modes.

use serde::{Deserialize, Serialize};
use std::fs::{Metadata, OpenOptions};
use std::time::{SystemTime, UNIX_EPOCH};

/// Attributes reported by `getattr`, in `stat(2)` terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttr {
    /// File type and permission bits (`st_mode`).
    pub mode: u32,
    /// Size in bytes.
    pub size: u64,
    /// Access time (Unix epoch seconds).
    pub atime: i64,
    /// Modification time (Unix epoch seconds).
    pub mtime: i64,
    /// Status change time (Unix epoch seconds).
    pub ctime: i64,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u64,
}

impl FileAttr {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFDIR as u32
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFREG as u32
    }
}

#[cfg(unix)]
impl From<&Metadata> for FileAttr {
    fn from(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            mode: meta.mode(),
            size: meta.size(),
            atime: meta.atime(),
            mtime: meta.mtime(),
            ctime: meta.ctime(),
            uid: meta.uid(),
            gid: meta.gid(),
            nlink: meta.nlink(),
        }
    }
}

#[cfg(not(unix))]
impl From<&Metadata> for FileAttr {
    fn from(meta: &Metadata) -> Self {
        let kind = if meta.is_dir() {
            libc::S_IFDIR as u32 | 0o755
        } else if meta.permissions().readonly() {
            libc::S_IFREG as u32 | 0o444
        } else {
            libc::S_IFREG as u32 | 0o644
        };
        let modified = epoch_seconds(meta.modified().ok());
        Self {
            mode: kind,
            size: meta.len(),
            atime: epoch_seconds(meta.accessed().ok()),
            mtime: modified,
            ctime: modified,
            uid: 0,
            gid: 0,
            nlink: 1,
        }
    }
}

#[cfg_attr(unix, allow(dead_code))]
fn epoch_seconds(time: Option<SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Access mode requested by `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl OpenMode {
    /// Derive the mode from POSIX `O_*` flags.
    pub fn from_flags(flags: i32) -> Self {
        match flags & libc::O_ACCMODE {
            libc::O_WRONLY => OpenMode::WriteOnly,
            libc::O_RDWR => OpenMode::ReadWrite,
            _ => OpenMode::ReadOnly,
        }
    }

    /// Whether this mode allows writing.
    pub fn writes(&self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }

    pub(crate) fn options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            OpenMode::ReadOnly => options.read(true),
            OpenMode::WriteOnly => options.write(true),
            OpenMode::ReadWrite => options.read(true).write(true),
        };
        options
    }
}
