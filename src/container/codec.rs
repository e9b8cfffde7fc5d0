//! Directory-level pack/unpack over the AEAD service.

use crate::archive::{
    build_archive, detect_sparse, extract_archive, ExtractReport, SparseCapability,
};
use crate::audit::AuditLedger;
use crate::config::ContainerConfig;
use crate::container::header::{read_header_from, ContainerHeader, Transport};
use crate::crypto::{AeadService, Aes256GcmAead, Key};
use crate::error::{Error, Result};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Packs directories into containers and back.
///
/// Owns the collaborators every transport needs: the AEAD service, the
/// platform sparse capability and the optional audit ledger.
pub struct ContainerCodec {
    aead: Arc<dyn AeadService>,
    sparse: Arc<dyn SparseCapability>,
    config: ContainerConfig,
    ledger: Option<AuditLedger>,
}

impl ContainerCodec {
    /// Create a codec with AES-256-GCM and the platform sparse capability.
    pub fn new(config: ContainerConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        let ledger = config
            .audit_ledger
            .as_deref()
            .map(AuditLedger::open)
            .transpose()?;
        Ok(Self {
            aead: Arc::new(Aes256GcmAead),
            sparse: detect_sparse(),
            config,
            ledger,
        })
    }

    /// Replace the AEAD service.
    pub fn with_aead(mut self, aead: Arc<dyn AeadService>) -> Self {
        self.aead = aead;
        self
    }

    /// Replace the sparse capability.
    pub fn with_sparse(mut self, sparse: Arc<dyn SparseCapability>) -> Self {
        self.sparse = sparse;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Audit ledger, if one is configured.
    pub fn ledger(&self) -> Option<&AuditLedger> {
        self.ledger.as_ref()
    }

    /// Pack `src` with the given transport.
    pub fn pack(&self, src: &Path, dest: &Path, key: &Key, transport: Transport) -> Result<()> {
        match transport {
            Transport::Buffered => self.pack_dir(src, dest, key),
            Transport::Streamed => self.pack_dir_stream(src, dest, key),
        }
    }

    /// Pack `src` into `dest`, encrypting the whole archive in one pass.
    ///
    /// Every file is stored with its full content.
    pub fn pack_dir(&self, src: &Path, dest: &Path, key: &Key) -> Result<()> {
        if !src.is_dir() {
            return Err(Error::SourceNotFound(src.to_path_buf()));
        }

        let mut scratch = BufWriter::new(tempfile::tempfile()?);
        let stats = build_archive(src, &mut scratch, None)?;
        let mut archive = scratch.into_inner().map_err(|e| e.into_error())?;

        archive.seek(SeekFrom::Start(0))?;
        let mut plaintext = Vec::new();
        archive.read_to_end(&mut plaintext)?;
        let ciphertext = self.aead.encrypt(key, &plaintext)?;

        let header = ContainerHeader::for_key(Transport::Buffered, key);
        write_container(dest, &header, |out| Ok(out.write_all(&ciphertext)?))?;

        debug!(
            "Packed {} into {} (buffered, {} files, {} dirs)",
            src.display(),
            dest.display(),
            stats.files,
            stats.directories
        );
        self.record(
            "pack",
            json!({
                "src": src.display().to_string(),
                "container": dest.display().to_string(),
                "transport": Transport::Buffered.magic(),
            }),
        );
        Ok(())
    }

    /// Pack `src` into `dest`, streaming the archive through the AEAD sink.
    ///
    /// Files above the configured sparse threshold are stored as placeholders.
    /// On unix the archive is produced by a `zilfs-archive` worker thread
    /// writing into a pipe; it is joined before this returns.
    pub fn pack_dir_stream(&self, src: &Path, dest: &Path, key: &Key) -> Result<()> {
        if !src.is_dir() {
            return Err(Error::SourceNotFound(src.to_path_buf()));
        }

        let header = ContainerHeader::for_key(Transport::Streamed, key);
        let threshold = Some(self.config.sparse_threshold);
        let mut sealed = 0;
        write_container(dest, &header, |out| {
            sealed = self.stream_archive(src, threshold, key, out)?;
            Ok(())
        })?;

        debug!(
            "Packed {} into {} (streamed, {} archive bytes)",
            src.display(),
            dest.display(),
            sealed
        );
        self.record(
            "pack",
            json!({
                "src": src.display().to_string(),
                "container": dest.display().to_string(),
                "transport": Transport::Streamed.magic(),
            }),
        );
        Ok(())
    }

    /// Produce the archive on a worker thread and encrypt it from the pipe.
    #[cfg(unix)]
    fn stream_archive(
        &self,
        src: &Path,
        threshold: Option<u64>,
        key: &Key,
        out: &mut dyn Write,
    ) -> Result<u64> {
        use crate::container::pipe::anonymous_pipe;
        use std::thread;

        let (reader, writer) = anonymous_pipe()?;
        let root = src.to_path_buf();
        let producer = thread::Builder::new()
            .name("zilfs-archive".to_string())
            .spawn(move || build_archive(&root, BufWriter::new(writer), threshold))?;

        // The read end must be closed before joining so a failed consumer
        // unblocks the producer.
        let sealed = {
            let mut reader = BufReader::new(reader);
            self.aead.encrypt_stream(key, &mut reader, out)
        };
        let built = producer
            .join()
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::Other, "archive producer panicked")))?;

        let sealed = sealed?;
        built?;
        Ok(sealed)
    }

    /// Without native pipes: build into a scratch file, then stream it.
    #[cfg(not(unix))]
    fn stream_archive(
        &self,
        src: &Path,
        threshold: Option<u64>,
        key: &Key,
        out: &mut dyn Write,
    ) -> Result<u64> {
        let scratch = NamedTempFile::new()?;
        build_archive(src, BufWriter::new(scratch.as_file()), threshold)?;
        self.sparse.mark_sparse(scratch.path())?;

        let mut reader = BufReader::new(File::open(scratch.path())?);
        self.aead.encrypt_stream(key, &mut reader, out)
    }

    /// Decrypt `container` and extract it under `dest`.
    ///
    /// The transport is taken from the header, so buffered and streamed
    /// containers are both accepted.
    pub fn unpack_dir(&self, container: &Path, dest: &Path, key: &Key) -> Result<ExtractReport> {
        if !container.is_file() {
            return Err(Error::ContainerNotFound(container.to_path_buf()));
        }

        let mut file = File::open(container)?;
        let (header, offset) = read_header_from(&mut file)?;
        file.seek(SeekFrom::Start(offset))?;

        let report = match header.magic {
            Transport::Buffered => {
                let mut ciphertext = Vec::new();
                file.read_to_end(&mut ciphertext)?;
                let plaintext = self.aead.decrypt(key, &ciphertext)?;
                extract_archive(Cursor::new(plaintext), dest, self.sparse.as_ref())?
            }
            Transport::Streamed => {
                let archive = self.decrypt_stream_to_scratch(file, key)?;
                extract_archive(BufReader::new(archive), dest, self.sparse.as_ref())?
            }
        };

        debug!(
            "Unpacked {} into {} ({} files, {} sparse)",
            container.display(),
            dest.display(),
            report.files,
            report.placeholders
        );
        self.record(
            "unpack",
            json!({
                "container": container.display().to_string(),
                "dest": dest.display().to_string(),
            }),
        );
        Ok(report)
    }

    /// Merge `fields` into the header, re-encrypting the payload unchanged.
    ///
    /// Expensive (full decrypt + encrypt); used for snapshot bookkeeping.
    pub fn rewrite_metadata(
        &self,
        container: &Path,
        key: &Key,
        fields: Map<String, Value>,
    ) -> Result<ContainerHeader> {
        if !container.is_file() {
            return Err(Error::ContainerNotFound(container.to_path_buf()));
        }

        let field_names: Vec<String> = fields.keys().cloned().collect();
        let mut file = File::open(container)?;
        let (mut header, offset) = read_header_from(&mut file)?;
        file.seek(SeekFrom::Start(offset))?;
        header.merge(fields)?;

        match header.magic {
            Transport::Buffered => {
                let mut ciphertext = Vec::new();
                file.read_to_end(&mut ciphertext)?;
                drop(file);
                let plaintext = self.aead.decrypt(key, &ciphertext)?;
                let resealed = self.aead.encrypt(key, &plaintext)?;
                write_container(container, &header, |out| Ok(out.write_all(&resealed)?))?;
            }
            Transport::Streamed => {
                let archive = self.decrypt_stream_to_scratch(file, key)?;
                let mut reader = BufReader::new(archive);
                write_container(container, &header, |out| {
                    self.aead.encrypt_stream(key, &mut reader, out)?;
                    Ok(())
                })?;
            }
        }

        self.record(
            "rewrite_metadata",
            json!({
                "container": container.display().to_string(),
                "fields": field_names,
            }),
        );
        Ok(header)
    }

    /// Authenticate the whole payload without extracting anything.
    pub fn verify(&self, container: &Path, key: &Key) -> Result<ContainerHeader> {
        if !container.is_file() {
            return Err(Error::ContainerNotFound(container.to_path_buf()));
        }

        let mut file = File::open(container)?;
        let (header, offset) = read_header_from(&mut file)?;
        file.seek(SeekFrom::Start(offset))?;

        match header.magic {
            Transport::Buffered => {
                let mut ciphertext = Vec::new();
                file.read_to_end(&mut ciphertext)?;
                self.aead.decrypt(key, &ciphertext)?;
            }
            Transport::Streamed => {
                let mut reader = BufReader::new(file);
                self.aead.decrypt_stream(key, &mut reader, &mut io::sink())?;
            }
        }
        Ok(header)
    }

    /// Decrypt a streamed payload into an anonymous scratch file, rewound.
    ///
    /// Nothing is extracted before the final chunk has authenticated.
    fn decrypt_stream_to_scratch(&self, payload: File, key: &Key) -> Result<File> {
        let mut archive = tempfile::tempfile()?;
        {
            let mut reader = BufReader::new(payload);
            let mut writer = BufWriter::new(&archive);
            self.aead.decrypt_stream(key, &mut reader, &mut writer)?;
            writer.flush()?;
        }
        archive.seek(SeekFrom::Start(0))?;
        Ok(archive)
    }

    pub(crate) fn record(&self, action: &str, params: Value) {
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.record(action, params) {
                warn!("Failed to append {} to audit ledger: {}", action, e);
            }
        }
    }
}

impl Default for ContainerCodec {
    fn default() -> Self {
        Self {
            aead: Arc::new(Aes256GcmAead),
            sparse: detect_sparse(),
            config: ContainerConfig::default(),
            ledger: None,
        }
    }
}

/// Write header + body to a sibling temp file, then move it over `dest`.
///
/// `dest` is only replaced once the body has been written completely.
fn write_container<F>(dest: &Path, header: &ContainerHeader, body: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let header_bytes = header.to_bytes()?;
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let tmp = NamedTempFile::new_in(parent)?;
    {
        let mut out = BufWriter::new(tmp.as_file());
        out.write_all(&header_bytes)?;
        body(&mut out)?;
        out.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
