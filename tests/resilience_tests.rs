//! Resilience tests: tampering, hostile archives and malformed headers.

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use zilfs::config::MAX_HEADER_SIZE;
use zilfs::container::{is_valid_container, read_header, ContainerHeader, Transport};
use zilfs::crypto::{AeadService, Aes256GcmAead};
use zilfs::{ContainerCodec, Error, Key};

fn test_key() -> Key {
    Key::from_bytes([0x77; 32])
}

/// Helper to create a small tree and pack it.
fn packed_container(dir: &Path, transport: Transport) -> std::path::PathBuf {
    let src = dir.join("src");
    fs::create_dir_all(src.join("sub")).expect("Failed to create dirs");
    fs::write(src.join("a.txt"), b"alpha").expect("Failed to write file");
    fs::write(src.join("sub/b.txt"), vec![b'b'; 3000]).expect("Failed to write file");

    let container = dir.join("vault.zil");
    ContainerCodec::default()
        .pack(&src, &container, &test_key(), transport)
        .expect("Failed to pack");
    container
}

/// Offset of the first encrypted byte.
fn payload_offset(bytes: &[u8]) -> usize {
    bytes
        .windows(2)
        .position(|w| w == b"\n\n")
        .expect("header terminator")
        + 2
}

/// Flip one bit at `offset` and return the path of the tampered copy.
fn flip_bit(container: &Path, offset: usize, bit: u8, out: &Path) {
    let mut bytes = fs::read(container).unwrap();
    bytes[offset] ^= 1 << bit;
    fs::write(out, bytes).unwrap();
}

#[test]
fn test_bit_flips_detected_in_both_transports() {
    for transport in [Transport::Buffered, Transport::Streamed] {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let container = packed_container(temp_dir.path(), transport);
        let bytes = fs::read(&container).unwrap();
        let start = payload_offset(&bytes);
        let len = bytes.len() - start;

        // First, last and a spread of positions in between.
        let mut offsets: Vec<usize> = (0..len).step_by((len / 48).max(1)).collect();
        offsets.push(len - 1);

        let codec = ContainerCodec::default();
        for (i, rel) in offsets.into_iter().enumerate() {
            let tampered = temp_dir.path().join(format!("t{}.zil", i));
            flip_bit(&container, start + rel, (i % 8) as u8, &tampered);

            let out = temp_dir.path().join(format!("out{}", i));
            let result = codec.unpack_dir(&tampered, &out, &test_key());
            assert!(
                matches!(result, Err(Error::Integrity)),
                "{:?}: flip at payload byte {} not detected",
                transport,
                rel
            );
            assert!(!out.join("a.txt").exists());
        }
    }
}

#[test]
fn test_truncated_payload_detected() {
    for transport in [Transport::Buffered, Transport::Streamed] {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let container = packed_container(temp_dir.path(), transport);
        let bytes = fs::read(&container).unwrap();

        let truncated = temp_dir.path().join("short.zil");
        fs::write(&truncated, &bytes[..bytes.len() - 1]).unwrap();
        let result = ContainerCodec::default().verify(&truncated, &test_key());
        assert!(matches!(result, Err(Error::Integrity)));

        let headless = temp_dir.path().join("headless.zil");
        fs::write(&headless, &bytes[..payload_offset(&bytes)]).unwrap();
        let result = ContainerCodec::default().verify(&headless, &test_key());
        assert!(matches!(result, Err(Error::Integrity)));
    }
}

/// Tar stream whose single entry name bypasses the builder's path checks.
fn hostile_archive(name: &[u8]) -> Vec<u8> {
    let data = b"owned";
    let mut header = tar::Header::new_old();
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&header, &data[..]).unwrap();
    builder.into_inner().unwrap()
}

#[test]
fn test_traversal_archive_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let container = temp_dir.path().join("hostile.zil");
    let dest = temp_dir.path().join("dest");

    let sealed = Aes256GcmAead
        .encrypt(&test_key(), &hostile_archive(b"../escape.txt"))
        .unwrap();
    let mut bytes = ContainerHeader::new(Transport::Buffered).to_bytes().unwrap();
    bytes.extend_from_slice(&sealed);
    fs::write(&container, bytes).unwrap();

    let result = ContainerCodec::default().unpack_dir(&container, &dest, &test_key());
    assert!(matches!(result, Err(Error::PathTraversal(_))));
    assert!(!temp_dir.path().join("escape.txt").exists());
    assert!(!dest.join("escape.txt").exists());
}

#[test]
fn test_absolute_entry_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let container = temp_dir.path().join("hostile.zil");
    let target = temp_dir.path().join("abs-escape.txt");
    let name = target.to_string_lossy().into_owned();
    if name.len() > 99 {
        // Does not fit an old-style header name field.
        return;
    }

    let sealed = Aes256GcmAead
        .encrypt(&test_key(), &hostile_archive(name.as_bytes()))
        .unwrap();
    let mut bytes = ContainerHeader::new(Transport::Buffered).to_bytes().unwrap();
    bytes.extend_from_slice(&sealed);
    fs::write(&container, bytes).unwrap();

    let result =
        ContainerCodec::default().unpack_dir(&container, &temp_dir.path().join("dest"), &test_key());
    assert!(result.is_err());
    assert!(!target.exists());
}

#[test]
fn test_oversized_header_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let container = temp_dir.path().join("big-header.zil");

    let padding = "x".repeat(MAX_HEADER_SIZE);
    let mut bytes = format!(
        "{{\"magic\":\"ZILANT\",\"version\":1,\"pad\":\"{}\"}}\n\n",
        padding
    )
    .into_bytes();
    bytes.extend_from_slice(&[0u8; 64]);
    fs::write(&container, bytes).unwrap();

    assert!(!is_valid_container(&container));
    assert!(matches!(read_header(&container), Err(Error::Format(_))));
    let result =
        ContainerCodec::default().unpack_dir(&container, &temp_dir.path().join("out"), &test_key());
    assert!(matches!(result, Err(Error::Format(_))));
}

#[test]
fn test_rewrite_cannot_exceed_header_limit() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let container = packed_container(temp_dir.path(), Transport::Buffered);
    let before = fs::read(&container).unwrap();

    let mut fields = serde_json::Map::new();
    fields.insert(
        "note".to_string(),
        serde_json::Value::String("y".repeat(MAX_HEADER_SIZE)),
    );
    let result = ContainerCodec::default().rewrite_metadata(&container, &test_key(), fields);

    assert!(matches!(result, Err(Error::Format(_))));
    assert_eq!(fs::read(&container).unwrap(), before);
}

#[test]
fn test_unknown_header_fields_survive_rewrite() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let container = packed_container(temp_dir.path(), Transport::Streamed);

    let codec = ContainerCodec::default();
    let mut fields = serde_json::Map::new();
    fields.insert("owner".to_string(), serde_json::json!("ops"));
    codec.rewrite_metadata(&container, &test_key(), fields).unwrap();

    let mut fields = serde_json::Map::new();
    fields.insert("label".to_string(), serde_json::json!("v9"));
    codec.rewrite_metadata(&container, &test_key(), fields).unwrap();

    let header = read_header(&container).unwrap();
    assert_eq!(header.extra.get("owner"), Some(&serde_json::json!("ops")));
    assert_eq!(header.label.as_deref(), Some("v9"));
    assert!(codec.verify(&container, &test_key()).is_ok());
}
