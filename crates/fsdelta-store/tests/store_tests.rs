use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use fsdelta_core::{
    EMPTY_HASH, ExtendedMetadata, FileRecord, PlatformMetadata, ScanStats, Snapshot, SystemInfo,
    ValidationError,
};
use fsdelta_store::{StoreError, load_snapshot, load_snapshot_header, save_snapshot};
use tempfile::TempDir;

fn representative_snapshot() -> Snapshot {
    let when = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
    let mut files = HashMap::new();

    let dir = FileRecord::new_directory("/data/etc", 0o040_755, when).with_metadata(Some(
        PlatformMetadata {
            owner_id: 0,
            group_id: 0,
            permissions: 0o755,
            extended: None,
        },
    ));

    let mut empty = FileRecord::new_file("/data/etc/empty.conf", 0, 0o100_644, when);
    empty.hash = EMPTY_HASH.to_string();

    let mut xattrs = BTreeMap::new();
    xattrs.insert("user.origin".to_string(), "installer".to_string());
    xattrs.insert("user.blob".to_string(), "00ff10".to_string());
    let mut label = BTreeMap::new();
    label.insert("label".to_string(), "system_u:object_r:shadow_t:s0".to_string());
    let mut shadow = FileRecord::new_file(
        "/data/etc/shadow",
        1234,
        0o100_640,
        when + chrono::Duration::nanoseconds(123_456_789),
    )
    .with_metadata(Some(PlatformMetadata {
        owner_id: 0,
        group_id: 42,
        permissions: 0o640,
        extended: Some(ExtendedMetadata {
            security_label: Some(label),
            xattrs: Some(xattrs),
        }),
    }));
    shadow.hash = "0123456789abcdef".to_string();

    for record in [dir, empty, shadow] {
        files.insert(record.path.clone(), record);
    }

    let mut stats = ScanStats::from_records(&files);
    stats.error_count = 1;
    stats.scan_duration = Duration::from_millis(1500);

    Snapshot::new(SystemInfo::new("/data", "store-test"), files, stats, Vec::new())
}

#[test]
fn test_save_load_roundtrip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("baseline.snap");
    let original = representative_snapshot();

    save_snapshot(&original, &path).unwrap();
    let loaded = load_snapshot(&path).unwrap();

    assert_eq!(loaded.files, original.files);
    assert_eq!(loaded.version, original.version);
    assert_eq!(loaded.system, original.system);
    assert_eq!(loaded.stats, original.stats);
    assert_eq!(loaded.root_digest, original.root_digest);
    assert_eq!(loaded.digest_summary, original.digest_summary);
    assert!(loaded.warnings.is_empty());
}

#[test]
fn test_header_only_read() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("baseline.snap");
    let original = representative_snapshot();
    save_snapshot(&original, &path).unwrap();

    // Chop off most of the body; the header must still be readable.
    let bytes = fs::read(&path).unwrap();
    let header_end = 8 + 4 + 8 + u64::from_le_bytes(bytes[12..20].try_into().unwrap()) as usize;
    fs::write(&path, &bytes[..header_end + 2]).unwrap();

    let header = load_snapshot_header(&path).unwrap();
    assert_eq!(header, original.header());
    assert_eq!(fs::read(&path).unwrap().len(), header_end + 2);

    assert!(matches!(
        load_snapshot(&path),
        Err(StoreError::Decode { .. })
    ));
}

#[test]
fn test_inconsistent_stats_are_repaired_on_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("stats.snap");
    let mut snapshot = representative_snapshot();
    snapshot.stats.file_count = 99;
    snapshot.stats.total_size = 1;
    save_snapshot(&snapshot, &path).unwrap();

    let loaded = load_snapshot(&path).unwrap();
    assert_eq!(loaded.stats.file_count, 2);
    assert_eq!(loaded.stats.total_size, 1234);
    assert_eq!(loaded.stats.dir_count, 1);
}

#[test]
fn test_digest_mismatch_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("digest.snap");
    let mut snapshot = representative_snapshot();
    snapshot.root_digest ^= 0xff;
    save_snapshot(&snapshot, &path).unwrap();

    assert!(matches!(
        load_snapshot(&path),
        Err(StoreError::Invalid(ValidationError::DigestMismatch { .. }))
    ));
}

#[test]
fn test_missing_hostname_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("host.snap");
    let mut snapshot = representative_snapshot();
    snapshot.system.hostname.clear();
    save_snapshot(&snapshot, &path).unwrap();

    assert!(matches!(
        load_snapshot(&path),
        Err(StoreError::Invalid(ValidationError::MissingHostname))
    ));
}

#[test]
fn test_open_and_create_failures() {
    let temp = TempDir::new().unwrap();
    assert!(matches!(
        load_snapshot(temp.path().join("missing.snap")),
        Err(StoreError::Open { .. })
    ));
    assert!(matches!(
        save_snapshot(
            &representative_snapshot(),
            temp.path().join("no/such/dir/out.snap")
        ),
        Err(StoreError::Create { .. })
    ));
}

#[test]
fn test_not_a_snapshot() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("plain.txt");
    fs::write(&path, "just some text, not a snapshot").unwrap();
    assert!(matches!(
        load_snapshot_header(&path),
        Err(StoreError::BadMagic { .. })
    ));
}

#[test]
fn test_save_overwrites_existing_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("snap");
    fs::write(&path, "old").unwrap();

    save_snapshot(&representative_snapshot(), &path).unwrap();
    assert!(load_snapshot(&path).is_ok());

    let leftovers = fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}
