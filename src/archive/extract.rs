//! Safe extraction of archives below a destination root.

use crate::archive::malformed;
use crate::archive::reader::sparse_size;
use crate::archive::sparse::SparseCapability;
use crate::error::{Error, Result};
use filetime::FileTime;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Counters collected while extracting an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub directories: usize,
    pub files: usize,
    pub placeholders: usize,
    pub skipped: usize,
}

/// Resolve `entry` against `root` and make sure it stays inside it.
///
/// `..` segments and absolute paths are folded into the joined path and any
/// existing prefix is canonicalized, so symlinks already present under the
/// root are followed before the containment check.
pub fn resolve_within(root: &Path, entry: &Path) -> Result<PathBuf> {
    let root = root.canonicalize()?;
    resolve_in_canonical(&root, entry)
}

fn resolve_in_canonical(root: &Path, entry: &Path) -> Result<PathBuf> {
    let joined = normalize(&root.join(entry));
    let resolved = canonicalize_existing(&joined)?;
    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(Error::PathTraversal(entry.to_path_buf()))
    }
}

/// Lexical check used at parse time: relative, never climbing above the root.
pub(crate) fn check_relative(entry: &Path) -> Result<()> {
    let mut depth = 0usize;
    for component in entry.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(Error::PathTraversal(entry.to_path_buf()));
            }
            Component::ParentDir => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::PathTraversal(entry.to_path_buf()))?;
            }
            Component::CurDir => {}
            Component::Normal(_) => depth += 1,
        }
    }
    Ok(())
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing prefix of `path` and re-attach the rest.
fn canonicalize_existing(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<OsString> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                for name in tail.iter().rev() {
                    resolved.push(name);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match (existing.file_name(), existing.parent()) {
                    (Some(name), Some(parent)) => {
                        tail.push(name.to_os_string());
                        existing = parent.to_path_buf();
                    }
                    _ => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Extract an archive under `dest`, restoring sparse placeholders.
///
/// Every entry is checked with the traversal guard before anything is
/// written for it. A rejected entry aborts the whole extraction; entries
/// already written stay in place.
pub fn extract_archive<R: Read>(
    reader: R,
    dest: &Path,
    sparse: &dyn SparseCapability,
) -> Result<ExtractReport> {
    fs::create_dir_all(dest)?;
    let root = dest.canonicalize()?;

    let mut archive = tar::Archive::new(reader);
    let mut report = ExtractReport::default();
    // Directory attributes are applied last, children change their mtime.
    let mut directories: Vec<(PathBuf, u32, u64)> = Vec::new();

    for entry in archive.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        let path = entry.path().map_err(malformed)?.into_owned();
        let target = resolve_in_canonical(&root, &path)?;

        let header = entry.header();
        let kind = header.entry_type();
        let mode = header.mode().map_err(malformed)?;
        let mtime = header.mtime().map_err(malformed)?;

        if kind.is_dir() {
            fs::create_dir_all(&target)?;
            if target != root {
                directories.push((target, mode, mtime));
            }
            report.directories += 1;
            continue;
        }

        if !kind.is_file() {
            warn!("Skipping unsupported {:?} entry {}", kind, path.display());
            report.skipped += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        if let Some(declared_size) = sparse_size(&mut entry)? {
            File::create(&target)?;
            sparse.mark_sparse(&target)?;
            sparse.truncate_to(&target, declared_size)?;
            debug!(
                "Restored sparse {} ({} bytes via {})",
                path.display(),
                declared_size,
                sparse.name()
            );
            report.placeholders += 1;
        } else {
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            report.files += 1;
        }

        apply_attributes(&target, mode, mtime)?;
    }

    for (dir, mode, mtime) in directories.iter().rev() {
        apply_attributes(dir, *mode, *mtime)?;
    }

    Ok(report)
}

fn apply_attributes(path: &Path, mode: u32, mtime: u64) -> Result<()> {
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime as i64, 0))?;
    set_mode(path, mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
