//! zilfs: encrypted single-file containers that mount as a directory tree.
//!
//! A container is a clear JSON header followed by an AES-256-GCM sealed tar
//! archive of a directory. Large files can be stored as sparse placeholders,
//! containers can be snapshotted and diffed, and a mounted container is served
//! through a POSIX-like operation set backed by a staging directory.
//!
//! # Architecture
//!
//! ```text
//! Directory → Archive (tar, sparse placeholders) → Seal (AEAD) → Container
//!                                                                    │
//!                          Snapshot / Diff ◄──── unpack / pack ◄─────┤
//!                          ZilFs session   ◄──── mount / teardown ◄──┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use zilfs::{ContainerCodec, Key};
//!
//! let codec = ContainerCodec::default();
//! let key = Key::from_bytes([7u8; 32]);
//!
//! codec.pack_dir(Path::new("./project"), Path::new("project.zil"), &key).unwrap();
//! codec.unpack_dir(Path::new("project.zil"), Path::new("./restored"), &key).unwrap();
//! ```

pub mod archive;
pub mod audit;
pub mod config;
pub mod container;
pub mod crypto;
pub mod error;
pub mod snapshot;
pub mod vfs;

pub use config::ContainerConfig;
pub use container::{ContainerCodec, ContainerHeader, Transport};
pub use crypto::{Key, KeyDerivation};
pub use error::{Error, Result};
pub use snapshot::{diff_snapshots, snapshot_container};
pub use vfs::{FilesystemBackend, MountOptions, SessionRegistry, ZilFs};
