//! Session path handling.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// A validated path inside a mounted session.
///
/// Driver paths come in as `/a/b` (the leading slash is optional). Empty and
/// `.` components are dropped; `..` is rejected outright so a path can never
/// leave the staging directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VfsPath {
    components: Vec<String>,
}

impl VfsPath {
    /// Parse a path string.
    pub fn parse(path: &str) -> Result<Self> {
        if path.contains('\0') {
            return Err(Error::InvalidPath("Path contains a NUL byte".to_string()));
        }

        let mut components = Vec::new();
        for component in path.split('/') {
            match component {
                "" | "." => continue,
                ".." => {
                    return Err(Error::InvalidPath(format!(
                        "Parent component not allowed: {}",
                        path
                    )))
                }
                name => components.push(name.to_string()),
            }
        }

        Ok(Self { components })
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Location of this path below the staging root.
    pub fn to_staging(&self, root: &Path) -> PathBuf {
        let mut full = root.to_path_buf();
        full.extend(&self.components);
        full
    }
}

impl std::fmt::Display for VfsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.components.join("/"))
    }
}
