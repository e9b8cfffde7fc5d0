//! Archive parsing.

use crate::archive::entry::ArchiveEntry;
use crate::archive::extract::check_relative;
use crate::archive::malformed;
use crate::config::SPARSE_SIZE_KEY;
use crate::error::{Error, Result};
use std::io::Read;
use tracing::debug;

/// Parse an archive into its entries, loading file contents into memory.
///
/// Entries whose path is absolute or climbs above the archive root are
/// rejected with `Error::PathTraversal` before anything else is read.
pub fn read_archive<R: Read>(reader: R) -> Result<Vec<ArchiveEntry>> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();

    for entry in archive.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        let path = entry.path().map_err(malformed)?.into_owned();
        check_relative(&path)?;

        let header = entry.header();
        let kind = header.entry_type();
        let mode = header.mode().map_err(malformed)?;
        let mtime = header.mtime().map_err(malformed)?;

        if kind.is_dir() {
            entries.push(ArchiveEntry::Directory { path, mode, mtime });
        } else if kind.is_file() {
            if let Some(declared_size) = sparse_size(&mut entry)? {
                entries.push(ArchiveEntry::SparsePlaceholder {
                    path,
                    declared_size,
                    mode,
                    mtime,
                });
            } else {
                let declared = entry.size();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).map_err(malformed)?;
                if data.len() as u64 != declared {
                    return Err(Error::Format(format!(
                        "truncated entry {}: {} of {} bytes",
                        path.display(),
                        data.len(),
                        declared
                    )));
                }
                entries.push(ArchiveEntry::File {
                    path,
                    data,
                    mode,
                    mtime,
                });
            }
        } else {
            debug!("Ignoring {:?} entry {}", kind, path.display());
        }
    }

    Ok(entries)
}

/// Declared logical size of a placeholder entry, if the entry is one.
pub(crate) fn sparse_size<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<Option<u64>> {
    let Some(extensions) = entry.pax_extensions().map_err(malformed)? else {
        return Ok(None);
    };

    for extension in extensions {
        let extension = extension.map_err(malformed)?;
        let key = extension
            .key()
            .map_err(|e| Error::Format(format!("pax key is not UTF-8: {}", e)))?;
        if key != SPARSE_SIZE_KEY {
            continue;
        }
        let value = extension
            .value()
            .map_err(|e| Error::Format(format!("pax value is not UTF-8: {}", e)))?;
        return value.trim().parse::<u64>().map(Some).map_err(|_| {
            Error::Format(format!("invalid {} value: {:?}", SPARSE_SIZE_KEY, value))
        });
    }

    Ok(None)
}
