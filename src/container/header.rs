//! Clear-text container header.

use crate::config::{CONTAINER_VERSION, HEADER_TERMINATOR, MAX_HEADER_SIZE};
use crate::crypto::Key;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// How the payload was encrypted, recorded as the header `magic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transport {
    /// Whole archive encrypted in one pass.
    #[serde(rename = "ZILANT")]
    Buffered,
    /// Archive encrypted chunk by chunk as it was produced.
    #[serde(rename = "ZSTR")]
    Streamed,
}

impl Transport {
    /// Header magic string.
    pub fn magic(&self) -> &'static str {
        match self {
            Transport::Buffered => crate::config::BUFFERED_MAGIC,
            Transport::Streamed => crate::config::STREAM_MAGIC,
        }
    }
}

/// Metadata stored in clear at the start of a container.
///
/// Never holds secret material: only the transport, the snapshot lineage and
/// the (public) key-derivation salt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerHeader {
    /// Payload transport.
    pub magic: Transport,
    /// Format version.
    pub version: u32,
    /// Snapshot label of this container, if it is a snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Label of the most recent snapshot in this container's lineage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_snapshot_id: Option<String>,
    /// Snapshot label -> creation timestamp (Unix seconds, as a string).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub snapshots: BTreeMap<String, String>,
    /// Hex Argon2id salt of the key the payload is sealed with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf_salt: Option<String>,
    /// Any other fields, kept verbatim across rewrites.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContainerHeader {
    /// Fresh header with no lineage.
    pub fn new(magic: Transport) -> Self {
        Self {
            magic,
            version: CONTAINER_VERSION,
            label: None,
            latest_snapshot_id: None,
            snapshots: BTreeMap::new(),
            kdf_salt: None,
            extra: Map::new(),
        }
    }

    /// Fresh header recording the salt of `key`, if it has one.
    pub fn for_key(magic: Transport, key: &Key) -> Self {
        Self {
            kdf_salt: key.salt_hex(),
            ..Self::new(magic)
        }
    }

    /// Whether the lineage has moved past this container's own label.
    pub fn has_diverged(&self) -> bool {
        match &self.latest_snapshot_id {
            Some(latest) if !latest.is_empty() => self.label.as_deref() != Some(latest.as_str()),
            _ => false,
        }
    }

    /// Merge `fields` over this header. `magic` and `version` are fixed.
    pub fn merge(&mut self, fields: Map<String, Value>) -> Result<()> {
        for reserved in ["magic", "version"] {
            if fields.contains_key(reserved) {
                return Err(Error::Format(format!(
                    "header field '{}' cannot be rewritten",
                    reserved
                )));
            }
        }

        let mut merged = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => return Err(Error::Format("header is not a JSON object".to_string())),
        };
        merged.extend(fields);
        *self = serde_json::from_value(Value::Object(merged))
            .map_err(|e| Error::Format(format!("invalid header field: {}", e)))?;
        Ok(())
    }

    /// Serialize with terminator, enforcing the size limit.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.extend_from_slice(HEADER_TERMINATOR);
        if bytes.len() > MAX_HEADER_SIZE {
            return Err(Error::Format(format!(
                "header is {} bytes, limit is {}",
                bytes.len(),
                MAX_HEADER_SIZE
            )));
        }
        Ok(bytes)
    }

    /// Parse the JSON part of a header (terminator excluded).
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let header: ContainerHeader = serde_json::from_slice(json)
            .map_err(|e| Error::Format(format!("invalid header: {}", e)))?;
        if header.version != CONTAINER_VERSION {
            return Err(Error::Format(format!(
                "unsupported container version {}",
                header.version
            )));
        }
        Ok(header)
    }
}

/// Read the header from the start of `reader`.
///
/// Returns the header and the payload offset. At most `MAX_HEADER_SIZE`
/// bytes are consumed; the caller must seek to the offset afterwards.
pub(crate) fn read_header_from(reader: &mut dyn Read) -> Result<(ContainerHeader, u64)> {
    let mut buf = Vec::with_capacity(MAX_HEADER_SIZE);
    Read::take(reader, MAX_HEADER_SIZE as u64).read_to_end(&mut buf)?;

    let end = buf
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .ok_or_else(|| {
            Error::Format(format!(
                "header terminator not found within {} bytes",
                MAX_HEADER_SIZE
            ))
        })?;

    let header = ContainerHeader::from_json(&buf[..end])?;
    Ok((header, (end + HEADER_TERMINATOR.len()) as u64))
}

/// Read the header of the container at `path`.
pub fn read_header(path: &Path) -> Result<ContainerHeader> {
    let mut file = File::open(path)?;
    read_header_from(&mut file).map(|(header, _)| header)
}

/// Header-only sanity check: known magic, supported version, valid framing.
pub fn is_valid_container(path: &Path) -> bool {
    read_header(path).is_ok()
}
