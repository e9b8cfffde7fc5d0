//! Append-only audit ledger.
//!
//! One JSON object per line: `{"timestamp", "action", "params", "sha256"}`.
//! The digest covers the compact serialization of the other three fields
//! with keys in sorted order, so each line can be checked on its own.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// A single ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unix time in seconds.
    pub timestamp: u64,
    pub action: String,
    pub params: Value,
    /// Hex SHA-256 over `{action, params, timestamp}`.
    pub sha256: String,
}

impl LedgerEntry {
    fn new(action: &str, params: Value) -> Result<Self> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let sha256 = digest(timestamp, action, &params)?;
        Ok(Self {
            timestamp,
            action: action.to_string(),
            params,
            sha256,
        })
    }

    /// Whether the stored digest matches the entry's content.
    pub fn is_intact(&self) -> bool {
        digest(self.timestamp, &self.action, &self.params)
            .map(|d| d == self.sha256)
            .unwrap_or(false)
    }
}

fn digest(timestamp: u64, action: &str, params: &Value) -> Result<String> {
    // serde_json's default map is ordered, so this is key-sorted.
    let canonical = serde_json::to_vec(&json!({
        "action": action,
        "params": params,
        "timestamp": timestamp,
    }))?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// File-backed audit ledger.
#[derive(Debug, Clone)]
pub struct AuditLedger {
    path: PathBuf,
}

impl AuditLedger {
    /// Open (or prepare) the ledger at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry.
    pub fn record(&self, action: &str, params: Value) -> Result<LedgerEntry> {
        let entry = LedgerEntry::new(action, params)?;
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(entry)
    }

    /// Record that a decoy tree was served instead of real content.
    pub fn record_decoy_event(&self, container: &Path, profile: &str) -> Result<LedgerEntry> {
        self.record(
            "decoy_event",
            json!({
                "container": container.display().to_string(),
                "profile": profile,
            }),
        )
    }

    /// All entries, in append order. A missing ledger is empty.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LedgerEntry = serde_json::from_str(&line).map_err(|e| {
                Error::Format(format!("audit ledger line {}: {}", n + 1, e))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Re-check every digest; returns the number of verified entries.
    pub fn verify(&self) -> Result<usize> {
        let entries = self.entries()?;
        for (n, entry) in entries.iter().enumerate() {
            if !entry.is_intact() {
                return Err(Error::Format(format!(
                    "audit ledger line {} fails its digest",
                    n + 1
                )));
            }
        }
        Ok(entries.len())
    }
}
