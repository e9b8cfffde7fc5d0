//! Archive building with the sparse-file transform.

use crate::config::SPARSE_SIZE_KEY;
use crate::error::{Error, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tar::{EntryType, Header, HeaderMode};
use tracing::debug;
use walkdir::WalkDir;

/// Counters collected while building an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Directory entries written.
    pub directories: usize,
    /// Files written with full content.
    pub files: usize,
    /// Files written as sparse placeholders.
    pub placeholders: usize,
    /// Symlinks and special files left out.
    pub skipped: usize,
    /// Content bytes actually stored.
    pub stored_bytes: u64,
}

/// Writes a directory tree as a tar stream.
pub struct ArchiveBuilder<W: Write> {
    inner: tar::Builder<W>,
    sparse_threshold: Option<u64>,
    stats: BuildStats,
}

impl<W: Write> ArchiveBuilder<W> {
    /// Create a builder that stores every file with full content.
    pub fn new(writer: W) -> Self {
        let mut inner = tar::Builder::new(writer);
        inner.mode(HeaderMode::Complete);
        inner.follow_symlinks(false);
        Self {
            inner,
            sparse_threshold: None,
            stats: BuildStats::default(),
        }
    }

    /// Store files strictly larger than `threshold` as sparse placeholders.
    pub fn sparse_threshold(mut self, threshold: Option<u64>) -> Self {
        self.sparse_threshold = threshold;
        self
    }

    /// Append every entry below `root`, sorted by relative path.
    pub fn append_tree(&mut self, root: &Path) -> Result<()> {
        if !root.is_dir() {
            return Err(Error::SourceNotFound(root.to_path_buf()));
        }

        for entry in WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(io::Error::from)?;
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| Error::InvalidPath(e.to_string()))?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                self.inner.append_dir(rel, entry.path())?;
                self.stats.directories += 1;
            } else if file_type.is_file() {
                let metadata = entry.metadata().map_err(io::Error::from)?;
                match self.sparse_threshold {
                    Some(threshold) if metadata.len() > threshold => {
                        self.append_placeholder(rel, &metadata)?;
                    }
                    _ => {
                        self.inner.append_path_with_name(entry.path(), rel)?;
                        self.stats.files += 1;
                        self.stats.stored_bytes += metadata.len();
                    }
                }
            } else {
                debug!("Skipping non-regular entry {}", entry.path().display());
                self.stats.skipped += 1;
            }
        }

        Ok(())
    }

    /// Append a zero-length entry declaring the file's logical size.
    fn append_placeholder(&mut self, rel: &Path, metadata: &fs::Metadata) -> Result<()> {
        let declared = metadata.len().to_string();
        self.inner
            .append_pax_extensions([(SPARSE_SIZE_KEY, declared.as_bytes())])?;

        let mut header = Header::new_gnu();
        header.set_metadata_in_mode(metadata, HeaderMode::Complete);
        header.set_entry_type(EntryType::Regular);
        header.set_size(0);
        self.inner.append_data(&mut header, rel, io::empty())?;

        debug!(
            "Stored {} as sparse placeholder ({} bytes)",
            rel.display(),
            declared
        );
        self.stats.placeholders += 1;
        Ok(())
    }

    /// Counters so far.
    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Write the end-of-archive marker and hand back the writer.
    pub fn finish(self) -> Result<(W, BuildStats)> {
        let stats = self.stats;
        let writer = self.inner.into_inner()?;
        Ok((writer, stats))
    }
}

/// Build an archive of `root` into `writer`.
pub fn build_archive<W: Write>(
    root: &Path,
    writer: W,
    sparse_threshold: Option<u64>,
) -> Result<BuildStats> {
    let mut builder = ArchiveBuilder::new(writer).sparse_threshold(sparse_threshold);
    builder.append_tree(root)?;
    let (mut writer, stats) = builder.finish()?;
    writer.flush()?;
    Ok(stats)
}
