use std::collections::{BTreeMap, HashMap};

use chrono::{TimeZone, Utc};
use fsdelta_core::{
    DigestSummary, EMPTY_HASH, ExtendedMetadata, FileRecord, PlatformMetadata,
    ScanConfig, ScanStats, Snapshot, SystemInfo, ValidationError, compute_root, format_hash,
};

fn record(path: &str, hash: &str, size: u64) -> FileRecord {
    let mut r = FileRecord::new_file(
        path,
        size,
        0o100_644,
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
    );
    r.hash = hash.to_string();
    r
}

fn snapshot_of(records: Vec<FileRecord>) -> Snapshot {
    let files: HashMap<String, FileRecord> =
        records.into_iter().map(|r| (r.path.clone(), r)).collect();
    let stats = ScanStats::from_records(&files);
    Snapshot::new(SystemInfo::new("/data", "testhost"), files, stats, Vec::new())
}

#[test]
fn test_snapshot_digest_is_independent_of_insertion_order() {
    let a = snapshot_of(vec![
        record("/data/a", "0000000000000001", 1),
        record("/data/b", "0000000000000002", 2),
        record("/data/c", EMPTY_HASH, 0),
    ]);
    let b = snapshot_of(vec![
        record("/data/c", EMPTY_HASH, 0),
        record("/data/b", "0000000000000002", 2),
        record("/data/a", "0000000000000001", 1),
    ]);

    assert_ne!(a.root_digest, 0);
    assert_eq!(a.root_digest, b.root_digest);
    assert_eq!(a.root_digest, compute_root(&a.files));
}

#[test]
fn test_directory_only_snapshot_has_stable_digest() {
    let now = Utc::now();
    let files: HashMap<String, FileRecord> = [
        FileRecord::new_directory("/data/x", 0o040_755, now),
        FileRecord::new_directory("/data/y", 0o040_700, now),
    ]
    .into_iter()
    .map(|r| (r.path.clone(), r))
    .collect();

    let stats = ScanStats::from_records(&files);
    assert_eq!(stats.dir_count, 2);
    assert_eq!(stats.file_count, 0);

    let snap = Snapshot::new(SystemInfo::new("/data", "h"), files, stats, Vec::new());
    assert_eq!(snap.digest_summary.leaf_count, 0);
    assert!(snap.verify_digest().is_ok());
}

#[test]
fn test_snapshot_new_corrects_inconsistent_stats() {
    let files: HashMap<String, FileRecord> = [
        record("/data/a", "00000000000000aa", 10),
        record("/data/b", "00000000000000bb", 5),
    ]
    .into_iter()
    .map(|r| (r.path.clone(), r))
    .collect();
    let stats = ScanStats {
        file_count: 99,
        dir_count: 3,
        total_size: 1,
        error_count: 2,
        scan_duration: std::time::Duration::from_millis(40),
    };

    let mut snap = Snapshot::new(SystemInfo::new("/data", "h"), files, stats, Vec::new());
    assert_eq!(snap.stats.file_count, 2);
    assert_eq!(snap.stats.dir_count, 0);
    assert_eq!(snap.stats.total_size, 15);
    assert_eq!(snap.stats.error_count, 2);
    assert_eq!(snap.stats.scan_duration, std::time::Duration::from_millis(40));
    assert_eq!(snap.validate(), Ok(false));
}

#[test]
fn test_snapshot_validation_after_tampering() {
    let mut snap = snapshot_of(vec![record("/data/a", "00000000000000aa", 10)]);
    assert_eq!(snap.validate(), Ok(false));

    snap.stats.total_size = 999;
    assert_eq!(snap.validate(), Ok(true));
    assert_eq!(snap.stats.total_size, 10);

    snap.files
        .get_mut("/data/a")
        .unwrap()
        .hash = format_hash(0xbb);
    assert!(matches!(
        snap.verify_digest(),
        Err(ValidationError::DigestMismatch { .. })
    ));
}

#[test]
fn test_digest_summary() {
    let snap = snapshot_of(vec![
        record("/data/a", "1", 1),
        record("/data/b", "2", 1),
        record("/data/c", "3", 1),
    ]);
    let summary = DigestSummary::new(snap.root_digest, &snap.files);
    assert_eq!(summary, snap.digest_summary);
    assert_eq!(summary.leaf_count, 3);
    assert_eq!(summary.depth, 3);
}

#[test]
fn test_record_serde_roundtrip_keeps_metadata() {
    let mut xattrs = BTreeMap::new();
    xattrs.insert("user.tag".to_string(), "blue".to_string());
    let mut label = BTreeMap::new();
    label.insert("label".to_string(), "system_u:object_r:etc_t:s0".to_string());

    let r = record("/data/a", "00000000000000aa", 3).with_metadata(Some(PlatformMetadata {
        owner_id: 1000,
        group_id: 100,
        permissions: 0o644,
        extended: Some(ExtendedMetadata {
            security_label: Some(label),
            xattrs: Some(xattrs),
        }),
    }));

    let json = serde_json::to_string(&r).unwrap();
    let back: FileRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, r);

    let bare = record("/data/b", "00000000000000bb", 3);
    let json = serde_json::to_string(&bare).unwrap();
    assert!(!json.contains("metadata"));
}

#[test]
fn test_scan_config_builder() {
    let config = ScanConfig::builder()
        .root("/test/path")
        .use_default_ignores(false)
        .ignore_patterns(vec!["*.tmp".to_string(), ".DS_Store".to_string()])
        .build()
        .unwrap();

    assert_eq!(config.root.to_str().unwrap(), "/test/path");

    let filter = config.path_filter();
    assert!(filter.should_ignore("/test/path/file.tmp"));
    assert!(filter.should_ignore("/test/path/.DS_Store"));
    assert!(!filter.should_ignore("/test/path/normal.txt"));
    assert!(!filter.should_ignore("/proc/self"));
}
