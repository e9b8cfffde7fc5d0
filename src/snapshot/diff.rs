//! Content-hash diff between two containers.

use crate::container::ContainerCodec;
use crate::crypto::Key;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Relative path -> (hash in a, hash in b). A side without the file is `""`.
pub type SnapshotDiff = BTreeMap<String, (String, String)>;

/// Hex SHA-256 of every regular file under `root`, keyed by `/`-separated
/// relative path.
pub fn hash_tree(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?;
        let name = rel
            .components()
            .map(|c| {
                c.as_os_str().to_str().ok_or_else(|| {
                    Error::InvalidPath(format!("non UTF-8 name: {}", rel.display()))
                })
            })
            .collect::<Result<Vec<_>>>()?
            .join("/");

        let mut hasher = Sha256::new();
        io::copy(&mut File::open(entry.path())?, &mut hasher)?;
        hashes.insert(name, hex::encode(hasher.finalize()));
    }

    Ok(hashes)
}

/// Files whose content differs between containers `a` and `b`.
///
/// Unchanged paths are omitted.
pub fn diff_snapshots(codec: &ContainerCodec, a: &Path, b: &Path, key: &Key) -> Result<SnapshotDiff> {
    let left = TempDir::new()?;
    let right = TempDir::new()?;
    codec.unpack_dir(a, left.path(), key)?;
    codec.unpack_dir(b, right.path(), key)?;

    let mut ha = hash_tree(left.path())?;
    let mut hb = hash_tree(right.path())?;

    let mut diff = SnapshotDiff::new();
    let names: Vec<String> = ha.keys().chain(hb.keys()).cloned().collect();
    for name in names {
        if diff.contains_key(&name) {
            continue;
        }
        let ia = ha.remove(&name).unwrap_or_default();
        let ib = hb.remove(&name).unwrap_or_default();
        if ia != ib {
            diff.insert(name, (ia, ib));
        }
    }
    Ok(diff)
}
