//! Snapshots, lineage tracking and rollback detection.
//!
//! A snapshot is a full copy of a container's content under a new name,
//! `{stem}_{label}{.ext}`. Both the copy and the source record the label in
//! their headers; a later mount of a container whose `latest_snapshot_id`
//! differs from its own `label` is refused unless forced.

mod diff;

pub use diff::{diff_snapshots, hash_tree, SnapshotDiff};

use crate::container::{read_header, ContainerCodec, ContainerHeader};
use crate::crypto::Key;
use crate::error::{Error, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tracing::info;

/// Refuse a diverged container unless `force` is set.
pub fn check_rollback(header: &ContainerHeader, force: bool) -> Result<()> {
    if !header.has_diverged() || force {
        return Ok(());
    }
    Err(Error::RollbackDetected {
        label: header.label.clone(),
        latest_snapshot_id: header.latest_snapshot_id.clone().unwrap_or_default(),
    })
}

/// Path a snapshot of `container` labelled `label` is written to.
pub fn snapshot_path(container: &Path, label: &str) -> Result<PathBuf> {
    validate_label(label)?;
    let stem = container
        .file_stem()
        .ok_or_else(|| Error::InvalidPath(container.display().to_string()))?;

    let mut name = stem.to_os_string();
    name.push("_");
    name.push(label);
    if let Some(ext) = container.extension() {
        name.push(".");
        name.push(ext);
    }
    Ok(container.with_file_name(name))
}

fn validate_label(label: &str) -> Result<()> {
    let bad = label.is_empty()
        || label == "."
        || label == ".."
        || label.contains('/')
        || label.contains('\\')
        || label.contains('\0');
    if bad {
        return Err(Error::InvalidLabel(label.to_string()));
    }
    Ok(())
}

fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .to_string()
}

/// Copy `container` into a labelled snapshot and record the lineage on both.
///
/// Returns the path of the new snapshot container. An existing file at that
/// path is replaced.
pub fn snapshot_container(
    codec: &ContainerCodec,
    container: &Path,
    key: &Key,
    label: &str,
) -> Result<PathBuf> {
    let out = snapshot_path(container, label)?;
    if !container.is_file() {
        return Err(Error::ContainerNotFound(container.to_path_buf()));
    }

    let header = read_header(container)?;
    let mut snapshots: BTreeMap<String, String> = header.snapshots.clone();
    snapshots.insert(label.to_string(), unix_timestamp());

    let scratch = TempDir::new()?;
    codec.unpack_dir(container, scratch.path(), key)?;
    codec.pack(scratch.path(), &out, key, header.magic)?;
    drop(scratch);

    let lineage = json!(snapshots);
    let mut snapshot_fields = Map::new();
    snapshot_fields.insert("label".to_string(), Value::from(label));
    snapshot_fields.insert("latest_snapshot_id".to_string(), Value::from(label));
    snapshot_fields.insert("snapshots".to_string(), lineage.clone());
    codec.rewrite_metadata(&out, key, snapshot_fields)?;

    let mut source_fields = Map::new();
    source_fields.insert("latest_snapshot_id".to_string(), Value::from(label));
    source_fields.insert("snapshots".to_string(), lineage);
    codec.rewrite_metadata(container, key, source_fields)?;

    info!(
        "Snapshot '{}' of {} written to {}",
        label,
        container.display(),
        out.display()
    );
    codec.record(
        "snapshot",
        json!({
            "container": container.display().to_string(),
            "snapshot": out.display().to_string(),
            "label": label,
        }),
    );
    Ok(out)
}
