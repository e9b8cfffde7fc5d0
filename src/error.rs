//! Error types for zilfs.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for zilfs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while packing, unpacking or serving a container.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from the underlying storage, passed through unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed container header or archive framing.
    #[error("Invalid container format: {0}")]
    Format(String),

    /// An archive entry resolves outside the extraction root.
    #[error("Path traversal in archive: {0}")]
    PathTraversal(PathBuf),

    /// AEAD tag verification failed (wrong key or corrupted payload).
    #[error("Integrity check failed: bad key or corrupted container")]
    Integrity,

    /// The container's lineage moved on past its own label.
    #[error(
        "Rollback detected: container label {label:?} does not match latest snapshot {latest_snapshot_id:?} (mount with force to override)"
    )]
    RollbackDetected {
        label: Option<String>,
        latest_snapshot_id: String,
    },

    /// Write attempted on a read-only session.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Container file not found.
    #[error("Container not found: {0}")]
    ContainerNotFound(PathBuf),

    /// Source directory not found.
    #[error("Source directory not found: {0}")]
    SourceNotFound(PathBuf),

    /// Invalid path format.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Snapshot label cannot be used to name a container.
    #[error("Invalid snapshot label: {0:?}")]
    InvalidLabel(String),

    /// Decoy profile name is not one of the known presets.
    #[error("Unknown decoy profile: {0}")]
    UnknownDecoyProfile(String),

    /// File handle is not open in this session.
    #[error("Bad file handle: {0}")]
    BadHandle(u64),

    /// Operation on a session that has already been torn down.
    #[error("Filesystem session is not mounted")]
    SessionClosed,

    /// Key derivation error.
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error means "the thing at that path does not exist".
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Error::ContainerNotFound(_) | Error::SourceNotFound(_) => true,
            _ => false,
        }
    }

    /// POSIX errno for reporting this error through a mount driver.
    pub fn errno(&self) -> i32 {
        match self {
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Error::PermissionDenied(_) => libc::EACCES,
            Error::ContainerNotFound(_) | Error::SourceNotFound(_) => libc::ENOENT,
            Error::InvalidPath(_) | Error::InvalidLabel(_) => libc::EINVAL,
            Error::PathTraversal(_) => libc::EPERM,
            Error::BadHandle(_) => libc::EBADF,
            _ => libc::EIO,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
