//! Filesystem layer over a mounted container.
//!
//! A [`ZilFs`] session materializes one container in a private staging
//! directory and serves POSIX-like operations on it through
//! [`FilesystemBackend`]. Wiring those callbacks to a kernel mount is left to
//! the host.

mod backend;
mod decoy;
mod path;
mod registry;
mod session;
mod types;

pub use backend::FilesystemBackend;
pub use decoy::DecoyProfile;
pub use path::VfsPath;
pub use registry::{SessionId, SessionInfo, SessionRegistry};
pub use session::{MountOptions, SessionState, ZilFs};
pub use types::{FileAttr, OpenMode};
