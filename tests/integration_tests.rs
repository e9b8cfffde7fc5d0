//! Integration tests for pack/unpack, snapshots and filesystem sessions.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use zilfs::config::SPARSE_THRESHOLD;
use zilfs::container::{read_header, Transport};
use zilfs::snapshot::{check_rollback, hash_tree};
use zilfs::vfs::{DecoyProfile, FilesystemBackend, MountOptions, OpenMode, SessionRegistry, ZilFs};
use zilfs::{
    diff_snapshots, snapshot_container, ContainerCodec, ContainerConfig, Error, Key,
    KeyDerivation,
};

fn test_key() -> Key {
    Key::from_bytes([0x3c; 32])
}

/// Helper to create a small directory tree.
fn setup_tree(root: &Path) {
    fs::create_dir_all(root.join("docs/nested")).expect("Failed to create dirs");
    fs::create_dir_all(root.join("empty")).expect("Failed to create empty dir");
    fs::write(root.join("readme.md"), b"# project\n").expect("Failed to write readme");
    fs::write(root.join("docs/guide.txt"), b"quick start").expect("Failed to write guide");
    fs::write(root.join("docs/nested/deep.bin"), vec![7u8; 4096]).expect("Failed to write bin");
    fs::write(root.join("zero.txt"), b"").expect("Failed to write empty file");
}

fn mount(container: &Path, key: Key, options: MountOptions) -> zilfs::Result<ZilFs> {
    ZilFs::mount(
        container,
        key,
        Arc::new(ContainerCodec::default()),
        Arc::new(SessionRegistry::new()),
        options,
    )
}

#[test]
fn test_roundtrip_both_transports() {
    for transport in [Transport::Buffered, Transport::Streamed] {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let out = temp_dir.path().join("out");
        let container = temp_dir.path().join("vault.zil");
        setup_tree(&src);

        let codec = ContainerCodec::default();
        codec
            .pack(&src, &container, &test_key(), transport)
            .expect("Failed to pack");
        assert_eq!(read_header(&container).unwrap().magic, transport);

        let report = codec
            .unpack_dir(&container, &out, &test_key())
            .expect("Failed to unpack");
        assert_eq!(report.files, 4);
        assert_eq!(report.placeholders, 0);

        assert_eq!(hash_tree(&src).unwrap(), hash_tree(&out).unwrap());
        assert!(out.join("empty").is_dir());
    }
}

#[cfg(unix)]
#[test]
fn test_roundtrip_preserves_mode_and_mtime() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let out = temp_dir.path().join("out");
    let container = temp_dir.path().join("vault.zil");
    setup_tree(&src);

    let script = src.join("run.sh");
    fs::write(&script, b"#!/bin/sh\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).unwrap();
    let mtime = filetime::FileTime::from_unix_time(1_600_000_000, 0);
    filetime::set_file_mtime(&script, mtime).unwrap();

    let codec = ContainerCodec::default();
    codec.pack_dir(&src, &container, &test_key()).unwrap();
    codec.unpack_dir(&container, &out, &test_key()).unwrap();

    let meta = fs::metadata(out.join("run.sh")).unwrap();
    assert_eq!(meta.permissions().mode() & 0o777, 0o750);
    assert_eq!(filetime::FileTime::from_last_modification_time(&meta), mtime);
}

#[test]
fn test_sparse_threshold_boundary() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let out = temp_dir.path().join("out");
    let container = temp_dir.path().join("vault.zil");
    fs::create_dir_all(&src).unwrap();

    let at_threshold: Vec<u8> = (0..SPARSE_THRESHOLD).map(|i| (i % 251) as u8 + 1).collect();
    let above_threshold = vec![0xffu8; SPARSE_THRESHOLD as usize + 1];
    fs::write(src.join("exact.bin"), &at_threshold).unwrap();
    fs::write(src.join("large.bin"), &above_threshold).unwrap();

    let codec = ContainerCodec::default();
    codec
        .pack_dir_stream(&src, &container, &test_key())
        .expect("Failed to pack");

    // Only the exact-threshold file is carried in the payload.
    let payload = fs::metadata(&container).unwrap().len();
    assert!(payload < SPARSE_THRESHOLD + SPARSE_THRESHOLD / 2);

    let report = codec
        .unpack_dir(&container, &out, &test_key())
        .expect("Failed to unpack");
    assert_eq!(report.placeholders, 1);

    assert_eq!(fs::read(out.join("exact.bin")).unwrap(), at_threshold);

    let restored = fs::read(out.join("large.bin")).unwrap();
    assert_eq!(restored.len() as u64, SPARSE_THRESHOLD + 1);
    assert!(restored.iter().all(|&b| b == 0));
}

#[test]
fn test_buffered_keeps_large_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let out = temp_dir.path().join("out");
    let container = temp_dir.path().join("vault.zil");
    fs::create_dir_all(&src).unwrap();

    let large = vec![0xabu8; SPARSE_THRESHOLD as usize + 10];
    fs::write(src.join("large.bin"), &large).unwrap();

    let codec = ContainerCodec::default();
    codec.pack_dir(&src, &container, &test_key()).unwrap();
    let report = codec.unpack_dir(&container, &out, &test_key()).unwrap();

    assert_eq!(report.placeholders, 0);
    assert_eq!(fs::read(out.join("large.bin")).unwrap(), large);
}

#[test]
fn test_custom_sparse_threshold() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let out = temp_dir.path().join("out");
    let container = temp_dir.path().join("vault.zil");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("small.txt"), b"0123456789").unwrap();
    fs::write(src.join("big.txt"), b"0123456789A").unwrap();

    let codec = ContainerCodec::new(ContainerConfig {
        sparse_threshold: 10,
        ..ContainerConfig::default()
    })
    .unwrap();
    codec.pack_dir_stream(&src, &container, &test_key()).unwrap();
    codec.unpack_dir(&container, &out, &test_key()).unwrap();

    assert_eq!(fs::read(out.join("small.txt")).unwrap(), b"0123456789");
    assert_eq!(fs::read(out.join("big.txt")).unwrap(), vec![0u8; 11]);
}

#[test]
fn test_wrong_key_is_integrity_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let container = temp_dir.path().join("vault.zil");
    setup_tree(&src);

    let codec = ContainerCodec::default();
    codec.pack_dir(&src, &container, &test_key()).unwrap();

    let result = codec.unpack_dir(
        &container,
        &temp_dir.path().join("out"),
        &Key::from_bytes([0u8; 32]),
    );
    assert!(matches!(result, Err(Error::Integrity)));
}

#[test]
fn test_password_derived_key_roundtrip() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let out = temp_dir.path().join("out");
    let container = temp_dir.path().join("vault.zil");
    setup_tree(&src);

    let key = KeyDerivation::new().derive_key("correct horse").unwrap();
    let codec = ContainerCodec::default();
    codec.pack_dir(&src, &container, &key).unwrap();

    let salt = read_header(&container).unwrap().kdf_salt.expect("salt recorded");
    let again = KeyDerivation::from_hex_salt(&salt)
        .unwrap()
        .derive_key("correct horse")
        .unwrap();
    codec.unpack_dir(&container, &out, &again).unwrap();
    assert_eq!(fs::read(out.join("docs/guide.txt")).unwrap(), b"quick start");
}

#[test]
fn test_snapshot_and_diff() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let t1 = temp_dir.path().join("t1");
    let t2 = temp_dir.path().join("t2");
    let container = temp_dir.path().join("vault.zil");
    setup_tree(&t1);
    setup_tree(&t2);
    fs::write(t2.join("docs/guide.txt"), b"revised guide").unwrap();
    fs::remove_file(t2.join("zero.txt")).unwrap();
    fs::write(t2.join("new.txt"), b"added later").unwrap();

    let codec = ContainerCodec::default();
    codec.pack_dir(&t1, &container, &test_key()).unwrap();
    let v1 = snapshot_container(&codec, &container, &test_key(), "v1").expect("Failed to snapshot");
    assert_eq!(v1, temp_dir.path().join("vault_v1.zil"));

    codec.pack_dir(&t2, &container, &test_key()).unwrap();

    let diff = diff_snapshots(&codec, &v1, &container, &test_key()).expect("Failed to diff");
    let changed: Vec<&str> = diff.keys().map(String::as_str).collect();
    assert_eq!(changed, vec!["docs/guide.txt", "new.txt", "zero.txt"]);
    assert_eq!(diff["new.txt"].0, "");
    assert_eq!(diff["zero.txt"].1, "");
    assert_ne!(diff["docs/guide.txt"].0, diff["docs/guide.txt"].1);

    let same = diff_snapshots(&codec, &v1, &v1, &test_key()).unwrap();
    assert!(same.is_empty());
}

#[test]
fn test_rollback_detection_on_mount() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let container = temp_dir.path().join("vault.zil");
    setup_tree(&src);

    let codec = ContainerCodec::default();
    codec.pack_dir(&src, &container, &test_key()).unwrap();
    let snapshot = snapshot_container(&codec, &container, &test_key(), "v1").unwrap();

    // The source now points at a lineage it is not labelled with.
    let header = read_header(&container).unwrap();
    assert!(check_rollback(&header, false).is_err());

    let result = mount(&container, test_key(), MountOptions::default());
    assert!(matches!(
        result,
        Err(Error::RollbackDetected { ref latest_snapshot_id, .. }) if latest_snapshot_id == "v1"
    ));

    let mut forced =
        mount(&container, test_key(), MountOptions::forced()).expect("Forced mount failed");
    assert!(!forced.is_read_only());
    assert_eq!(forced.getattr("/readme.md").unwrap().size, 10);
    forced.destroy().unwrap();

    let mut snap = mount(&snapshot, test_key(), MountOptions::default()).expect("Snapshot mount failed");
    assert!(snap.getattr("/docs/guide.txt").unwrap().is_file());
    snap.destroy().unwrap();
}

#[test]
fn test_session_teardown_creates_container() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let container = temp_dir.path().join("fresh.zil");
    let registry = Arc::new(SessionRegistry::new());

    let mut session = ZilFs::mount(
        &container,
        test_key(),
        Arc::new(ContainerCodec::default()),
        Arc::clone(&registry),
        MountOptions::default(),
    )
    .expect("Failed to mount");
    assert_eq!(registry.len(), 1);
    assert_eq!(session.readdir("/").unwrap(), vec![".", ".."]);

    session.mkdir("/notes", 0o755).unwrap();
    let fh = session.create("/notes/today.txt", 0o644).unwrap();
    session.write(fh, 0, b"first line\n").unwrap();
    session.write(fh, 11, b"second line\n").unwrap();
    session.release(fh).unwrap();
    session.rename("/notes/today.txt", "/notes/log.txt").unwrap();
    session.truncate("/notes/log.txt", 10).unwrap();

    session.destroy().expect("Teardown failed");
    session.destroy().expect("Second teardown failed");
    assert!(registry.is_empty());
    assert!(container.is_file());

    let out = temp_dir.path().join("out");
    ContainerCodec::default()
        .unpack_dir(&container, &out, &test_key())
        .unwrap();
    assert_eq!(fs::read(out.join("notes/log.txt")).unwrap(), b"first line");
}

#[test]
fn test_stream_on_teardown() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let container = temp_dir.path().join("vault.zil");
    let codec = ContainerCodec::new(ContainerConfig {
        stream_on_teardown: true,
        ..ContainerConfig::default()
    })
    .unwrap();

    let mut session = ZilFs::mount(
        &container,
        test_key(),
        Arc::new(codec),
        Arc::new(SessionRegistry::new()),
        MountOptions::default(),
    )
    .unwrap();
    let fh = session.create("/a.txt", 0o644).unwrap();
    session.write(fh, 0, b"streamed").unwrap();
    session.destroy().unwrap();

    assert_eq!(read_header(&container).unwrap().magic, Transport::Streamed);
}

#[test]
fn test_teardown_with_missing_destination() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let container = temp_dir.path().join("gone/vault.zil");
    let registry = Arc::new(SessionRegistry::new());

    let mut session = ZilFs::mount(
        &container,
        test_key(),
        Arc::new(ContainerCodec::default()),
        Arc::clone(&registry),
        MountOptions::default(),
    )
    .unwrap();
    let fh = session.create("/a.txt", 0o644).unwrap();
    session.write(fh, 0, b"lost").unwrap();

    session.destroy().expect("Missing destination must not fail teardown");
    assert!(registry.is_empty());
    assert!(!container.exists());
}

#[test]
fn test_wrong_key_mounts_read_only() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let container = temp_dir.path().join("vault.zil");
    setup_tree(&src);
    ContainerCodec::default()
        .pack_dir(&src, &container, &test_key())
        .unwrap();
    let before = fs::read(&container).unwrap();

    let mut session = mount(&container, Key::from_bytes([1u8; 32]), MountOptions::default())
        .expect("Integrity failure must not abort mount");
    assert!(session.is_read_only());
    assert_eq!(session.readdir("/").unwrap(), vec![".", ".."]);
    assert!(matches!(
        session.create("/x.txt", 0o644),
        Err(Error::PermissionDenied(_))
    ));

    session.destroy().unwrap();
    assert_eq!(fs::read(&container).unwrap(), before);
}

fn assert_all_writes_denied(session: &mut ZilFs, existing_file: &str, existing_dir: &str) {
    let staging = session.staging_dir().to_path_buf();
    let before = hash_tree(&staging).unwrap();

    let denied = |r: zilfs::Result<()>| matches!(r, Err(Error::PermissionDenied(_)));
    assert!(matches!(
        session.create("/new.txt", 0o644),
        Err(Error::PermissionDenied(_))
    ));
    assert!(matches!(
        session.open(existing_file, OpenMode::ReadWrite),
        Err(Error::PermissionDenied(_))
    ));
    let fh = session.open(existing_file, OpenMode::ReadOnly).unwrap();
    assert!(matches!(
        session.write(fh, 0, b"overwrite"),
        Err(Error::PermissionDenied(_))
    ));
    session.release(fh).unwrap();
    assert!(denied(session.truncate(existing_file, 0)));
    assert!(denied(session.unlink(existing_file)));
    assert!(denied(session.mkdir("/newdir", 0o755)));
    assert!(denied(session.rmdir(existing_dir)));
    assert!(denied(session.rename(existing_file, "/moved.txt")));

    assert_eq!(hash_tree(&staging).unwrap(), before);
    assert!(staging.join(existing_dir.trim_start_matches('/')).is_dir());
}

#[test]
fn test_decoy_session_is_read_only() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let container = temp_dir.path().join("vault.zil");

    let mut session = mount(
        &container,
        test_key(),
        MountOptions::decoy(DecoyProfile::Adaptive),
    )
    .expect("Failed to mount decoy");
    assert!(session.is_read_only());
    assert_eq!(
        session.readdir("/").unwrap(),
        vec![".", "..", "docs", "img", "logs", "notes", "readme.md"]
    );

    assert_all_writes_denied(&mut session, "/readme.md", "/docs");
    session.destroy().unwrap();
    assert!(!container.exists());
}

#[test]
fn test_ro_session_rejects_writes() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let container = temp_dir.path().join("vault.zil");
    setup_tree(&src);
    ContainerCodec::default()
        .pack_dir(&src, &container, &test_key())
        .unwrap();

    let mut session = mount(&container, test_key(), MountOptions::read_only()).unwrap();
    assert_all_writes_denied(&mut session, "/docs/guide.txt", "/empty");

    let fh = session.open("/docs/guide.txt", OpenMode::ReadOnly).unwrap();
    assert_eq!(session.read(fh, 0, 64).unwrap(), b"quick start");
}

#[test]
fn test_decoy_ignores_real_container() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let src = temp_dir.path().join("src");
    let container = temp_dir.path().join("vault.zil");
    setup_tree(&src);
    ContainerCodec::default()
        .pack_dir(&src, &container, &test_key())
        .unwrap();
    let before = fs::read(&container).unwrap();

    let mut session = mount(
        &container,
        Key::from_bytes([0u8; 32]),
        MountOptions::decoy(DecoyProfile::Minimal),
    )
    .unwrap();
    assert_eq!(session.readdir("/").unwrap(), vec![".", "..", "dummy.txt"]);
    let fh = session.open("/dummy.txt", OpenMode::ReadOnly).unwrap();
    assert_eq!(session.read(fh, 0, 100).unwrap(), b"lorem ipsum");
    session.destroy().unwrap();

    assert_eq!(fs::read(&container).unwrap(), before);
}

#[test]
fn test_throughput_accessor() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut session = mount(
        &temp_dir.path().join("vault.zil"),
        test_key(),
        MountOptions::default(),
    )
    .unwrap();

    let data = vec![0x5au8; 2 * 1024 * 1024];
    let fh = session.create("/blob.bin", 0o644).unwrap();
    session.write(fh, 0, &data).unwrap();
    assert_eq!(session.bytes_transferred(), data.len() as u64);

    let before_reset = Instant::now();
    session.throughput_mb_s();
    let after_reset = Instant::now();
    assert_eq!(session.bytes_transferred(), 0);

    let read = session.read(fh, 0, data.len()).unwrap();
    assert_eq!(read.len(), data.len());
    thread::sleep(Duration::from_millis(50));

    let shortest = after_reset.elapsed().as_secs_f64();
    let mb_s = session.throughput_mb_s();
    let longest = before_reset.elapsed().as_secs_f64();
    assert_eq!(session.bytes_transferred(), 0);

    let mb = data.len() as f64 / (1024.0 * 1024.0);
    let tolerance = 1e-9;
    assert!(mb_s <= mb / shortest + tolerance, "{} > {}", mb_s, mb / shortest);
    assert!(mb_s >= mb / longest - tolerance, "{} < {}", mb_s, mb / longest);
}

#[test]
fn test_concurrent_sessions_share_registry() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let registry = Arc::new(SessionRegistry::new());
    let codec = Arc::new(ContainerCodec::default());

    let workers: Vec<_> = (0..4)
        .map(|n| {
            let registry = Arc::clone(&registry);
            let codec = Arc::clone(&codec);
            let container = temp_dir.path().join(format!("c{}.zil", n));
            thread::spawn(move || {
                let mut session = ZilFs::mount(
                    &container,
                    test_key(),
                    codec,
                    registry,
                    MountOptions::default(),
                )
                .unwrap();
                let fh = session.create("/id.txt", 0o644).unwrap();
                session.write(fh, 0, format!("{}", n).as_bytes()).unwrap();
                session.destroy().unwrap();
                container
            })
        })
        .collect();

    for worker in workers {
        let container = worker.join().unwrap();
        assert!(container.is_file());
    }
    assert!(registry.is_empty());
}
