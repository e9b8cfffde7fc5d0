//! A mounted container: staging directory, handles and teardown.

use crate::container::{read_header, ContainerCodec, Transport};
use crate::crypto::Key;
use crate::error::{Error, Result};
use crate::snapshot::check_rollback;
use crate::vfs::backend::FilesystemBackend;
use crate::vfs::decoy::DecoyProfile;
use crate::vfs::path::VfsPath;
use crate::vfs::registry::{SessionId, SessionRegistry};
use crate::vfs::types::{FileAttr, OpenMode};
use serde_json::json;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Minimum interval used by the throughput accessor, in seconds.
const MIN_INTERVAL_SECS: f64 = 1e-3;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
}

/// How a container is presented.
#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    /// Refuse every write-class operation.
    pub read_only: bool,
    /// Serve a placeholder tree instead of the container (implies read-only).
    pub decoy: Option<DecoyProfile>,
    /// Mount even if the lineage check fails.
    pub force: bool,
}

impl MountOptions {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn decoy(profile: DecoyProfile) -> Self {
        Self {
            decoy: Some(profile),
            ..Self::default()
        }
    }

    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

/// Filesystem session over one container.
///
/// The container is unpacked into a private staging directory on mount and
/// packed back on [`destroy`](FilesystemBackend::destroy) (or drop) unless the
/// session is read-only.
pub struct ZilFs {
    container: PathBuf,
    key: Key,
    codec: Arc<ContainerCodec>,
    registry: Arc<SessionRegistry>,
    id: SessionId,
    staging: Option<TempDir>,
    root: PathBuf,
    read_only: bool,
    state: SessionState,
    handles: HashMap<u64, File>,
    next_fh: u64,
    bytes_rw: u64,
    started: Instant,
}

impl ZilFs {
    /// Mount `container`.
    ///
    /// With a decoy profile the container is never opened. Otherwise an
    /// existing container is checked for rollback and unpacked; a failed
    /// integrity check leaves an empty read-only session instead of an
    /// error. A missing container starts an empty writable session that
    /// creates it on teardown.
    pub fn mount(
        container: &Path,
        key: Key,
        codec: Arc<ContainerCodec>,
        registry: Arc<SessionRegistry>,
        options: MountOptions,
    ) -> Result<Self> {
        let staging = TempDir::new()?;
        let mut session = Self {
            container: container.to_path_buf(),
            key,
            codec,
            registry,
            id: 0,
            root: staging.path().to_path_buf(),
            staging: Some(staging),
            read_only: options.read_only,
            state: SessionState::Mounting,
            handles: HashMap::new(),
            next_fh: 1,
            bytes_rw: 0,
            started: Instant::now(),
        };

        session.populate(&options)?;
        session.id = session.registry.register(container, session.read_only);
        session.state = SessionState::Mounted;
        session.started = Instant::now();
        info!(
            "Mounted {} as session {}{}",
            container.display(),
            session.id,
            if session.read_only { " (read-only)" } else { "" }
        );
        Ok(session)
    }

    /// Fill the staging directory according to `options`.
    fn populate(&mut self, options: &MountOptions) -> Result<()> {
        if let Some(profile) = options.decoy {
            profile.populate(&self.root)?;
            self.read_only = true;
            info!(
                "Serving decoy profile '{}' for {}",
                profile,
                self.container.display()
            );
            self.codec.record(
                "decoy_event",
                json!({
                    "container": self.container.display().to_string(),
                    "profile": profile.name(),
                }),
            );
            return Ok(());
        }

        if !self.container.exists() {
            debug!(
                "{} does not exist yet; starting empty",
                self.container.display()
            );
            return Ok(());
        }

        let header = read_header(&self.container)?;
        check_rollback(&header, options.force)?;

        match self.codec.unpack_dir(&self.container, &self.root, &self.key) {
            Ok(report) => {
                debug!(
                    "Unpacked {} files into staging for {}",
                    report.files,
                    self.container.display()
                );
                Ok(())
            }
            Err(Error::Integrity) => {
                warn!(
                    "Integrity check failed for {}; mounting read-only",
                    self.container.display()
                );
                self.read_only = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn container(&self) -> &Path {
        &self.container
    }

    /// Staging directory backing this session.
    pub fn staging_dir(&self) -> &Path {
        &self.root
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bytes moved by `read`/`write` since the last throughput reading.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_rw
    }

    /// MB/s since the previous call (or mount); resets counter and timer.
    pub fn throughput_mb_s(&mut self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64().max(MIN_INTERVAL_SECS);
        let mb = self.bytes_rw as f64 / BYTES_PER_MB;
        self.bytes_rw = 0;
        self.started = Instant::now();
        mb / elapsed
    }

    fn ensure_mounted(&self) -> Result<()> {
        if self.state == SessionState::Mounted {
            Ok(())
        } else {
            Err(Error::SessionClosed)
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_mounted()?;
        if self.read_only {
            return Err(Error::PermissionDenied(format!(
                "{} is mounted read-only",
                self.container.display()
            )));
        }
        Ok(())
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        Ok(VfsPath::parse(path)?.to_staging(&self.root))
    }

    /// Like `resolve`, but refuses the mount root itself.
    fn resolve_entry(&self, path: &str) -> Result<PathBuf> {
        let parsed = VfsPath::parse(path)?;
        if parsed.is_root() {
            return Err(Error::InvalidPath(format!(
                "Operation not allowed on the mount root: {}",
                path
            )));
        }
        Ok(parsed.to_staging(&self.root))
    }

    fn insert_handle(&mut self, file: File) -> u64 {
        let fh = self.next_fh;
        self.next_fh += 1;
        self.handles.insert(fh, file);
        fh
    }

    fn handle(&mut self, fh: u64) -> Result<&mut File> {
        self.handles.get_mut(&fh).ok_or(Error::BadHandle(fh))
    }

    fn teardown_transport(&self) -> Transport {
        if self.codec.config().stream_on_teardown {
            Transport::Streamed
        } else {
            Transport::Buffered
        }
    }

    fn release_staging(&mut self) {
        if let Some(staging) = self.staging.take() {
            if let Err(e) = staging.close() {
                warn!("Failed to remove staging directory: {}", e);
            }
        }
        self.registry.deregister(self.id);
    }
}

impl FilesystemBackend for ZilFs {
    fn getattr(&self, path: &str) -> Result<FileAttr> {
        self.ensure_mounted()?;
        let meta = fs::symlink_metadata(self.resolve(path)?)?;
        Ok(FileAttr::from(&meta))
    }

    fn readdir(&self, path: &str) -> Result<Vec<String>> {
        self.ensure_mounted()?;
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        let mut listing = vec![".".to_string(), "..".to_string()];
        listing.extend(names);
        Ok(listing)
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<u64> {
        if mode.writes() {
            self.ensure_writable()?;
        } else {
            self.ensure_mounted()?;
        }
        let file = mode.options().open(self.resolve_entry(path)?)?;
        Ok(self.insert_handle(file))
    }

    fn create(&mut self, path: &str, mode: u32) -> Result<u64> {
        self.ensure_writable()?;
        let target = self.resolve_entry(path)?;

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let file = options.open(target)?;
        Ok(self.insert_handle(file))
    }

    fn read(&mut self, fh: u64, offset: u64, size: usize) -> Result<Vec<u8>> {
        self.ensure_mounted()?;
        let file = self.handle(fh)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut data = Vec::new();
        file.take(size as u64).read_to_end(&mut data)?;
        self.bytes_rw += data.len() as u64;
        Ok(data)
    }

    fn write(&mut self, fh: u64, offset: u64, data: &[u8]) -> Result<usize> {
        self.ensure_writable()?;
        let file = self.handle(fh)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.bytes_rw += data.len() as u64;
        Ok(data.len())
    }

    fn truncate(&mut self, path: &str, length: u64) -> Result<()> {
        self.ensure_writable()?;
        let file = OpenOptions::new().write(true).open(self.resolve_entry(path)?)?;
        file.set_len(length)?;
        Ok(())
    }

    fn flush(&mut self, fh: u64) -> Result<()> {
        self.ensure_mounted()?;
        let file = self.handle(fh)?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn release(&mut self, fh: u64) -> Result<()> {
        self.handles.remove(&fh).ok_or(Error::BadHandle(fh))?;
        Ok(())
    }

    fn unlink(&mut self, path: &str) -> Result<()> {
        self.ensure_writable()?;
        fs::remove_file(self.resolve_entry(path)?)?;
        Ok(())
    }

    fn mkdir(&mut self, path: &str, mode: u32) -> Result<()> {
        self.ensure_writable()?;
        let target = self.resolve_entry(path)?;

        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        builder.create(target)?;
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> Result<()> {
        self.ensure_writable()?;
        fs::remove_dir(self.resolve_entry(path)?)?;
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.ensure_writable()?;
        fs::rename(self.resolve_entry(from)?, self.resolve_entry(to)?)?;
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        if self.state == SessionState::Unmounted {
            return Ok(());
        }
        self.state = SessionState::Unmounting;
        self.handles.clear();

        if !self.read_only {
            let transport = self.teardown_transport();
            match self.codec.pack(&self.root, &self.container, &self.key, transport) {
                Ok(()) => debug!(
                    "Packed session {} back into {}",
                    self.id,
                    self.container.display()
                ),
                Err(e) if e.is_not_found() => warn!(
                    "Destination for {} vanished; nothing written: {}",
                    self.container.display(),
                    e
                ),
                Err(e) => {
                    self.state = SessionState::Mounted;
                    return Err(e);
                }
            }
        }

        self.release_staging();
        self.state = SessionState::Unmounted;
        info!("Unmounted session {} ({})", self.id, self.container.display());
        Ok(())
    }
}

impl Drop for ZilFs {
    fn drop(&mut self) {
        match self.state {
            SessionState::Unmounted => return,
            // Mount failed part way: nothing to persist.
            SessionState::Mounting => {
                self.release_staging();
                return;
            }
            SessionState::Mounted | SessionState::Unmounting => {}
        }
        if let Err(e) = self.destroy() {
            warn!(
                "Teardown of {} failed, changes are lost: {}",
                self.container.display(),
                e
            );
            self.release_staging();
        }
    }
}
