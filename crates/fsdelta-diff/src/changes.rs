//! Record equality and change tags.

use std::collections::BTreeMap;

use fsdelta_core::{ExtendedMetadata, FileRecord, PlatformMetadata};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Label key holding the SELinux context inside a security label map.
const LABEL_KEY: &str = "label";

/// Whether two records for the same path describe the same object.
///
/// Directories compare on mode, modification time and metadata. Files
/// compare on content hash, size, mode and metadata; their modification
/// time alone never makes them differ.
pub fn records_equal(old: &FileRecord, new: &FileRecord) -> bool {
    match (old.is_dir, new.is_dir) {
        (true, true) => {
            old.mode == new.mode && old.modified == new.modified && old.metadata == new.metadata
        }
        (false, false) => {
            old.hash == new.hash
                && old.size == new.size
                && old.mode == new.mode
                && old.metadata == new.metadata
        }
        _ => false,
    }
}

/// Describe how `new` differs from `old`.
///
/// Tags come in a fixed order: content, size, mode, mtime, then ownership
/// and extended metadata. Returns `["unknown"]` rather than an empty list.
pub fn describe_changes(old: &FileRecord, new: &FileRecord) -> Vec<String> {
    let mut changes = Vec::new();

    if old.hash != new.hash && !old.hash.is_empty() && !new.hash.is_empty() {
        changes.push("content".to_string());
    }
    if old.size != new.size {
        changes.push(format!("size ({} → {})", old.size, new.size));
    }
    if old.mode != new.mode {
        changes.push(format!(
            "permissions ({} → {})",
            old.mode_string(),
            new.mode_string()
        ));
    }
    if old.modified != new.modified {
        changes.push(format!(
            "mtime ({} → {})",
            old.modified.format(TIME_FORMAT),
            new.modified.format(TIME_FORMAT)
        ));
    }

    match (&old.metadata, &new.metadata) {
        (Some(a), Some(b)) => describe_platform(a, b, &mut changes),
        (None, None) => {}
        _ => changes.push("metadata".to_string()),
    }

    if changes.is_empty() {
        changes.push("unknown".to_string());
    }
    changes
}

fn describe_platform(old: &PlatformMetadata, new: &PlatformMetadata, changes: &mut Vec<String>) {
    if old.owner_id != new.owner_id {
        changes.push(format!("uid ({} → {})", old.owner_id, new.owner_id));
    }
    if old.group_id != new.group_id {
        changes.push(format!("gid ({} → {})", old.group_id, new.group_id));
    }
    if old.permissions != new.permissions {
        changes.push(format!(
            "permissions ({:04o} → {:04o})",
            old.permissions, new.permissions
        ));
    }
    describe_extended(old.extended.as_ref(), new.extended.as_ref(), changes);
}

fn describe_extended(
    old: Option<&ExtendedMetadata>,
    new: Option<&ExtendedMetadata>,
    changes: &mut Vec<String>,
) {
    match (old, new) {
        (None, None) => {}
        (None, Some(new)) => {
            if new.security_label.is_some() {
                changes.push("selinux added".to_string());
            }
            if let Some(xattrs) = &new.xattrs {
                changes.push(format!("xattrs added ({})", xattrs.len()));
            }
        }
        (Some(old), None) => {
            if old.security_label.is_some() {
                changes.push("selinux removed".to_string());
            }
            if let Some(xattrs) = &old.xattrs {
                changes.push(format!("xattrs removed ({})", xattrs.len()));
            }
        }
        (Some(old), Some(new)) => {
            if old.security_label != new.security_label {
                let before = label(old);
                let after = label(new);
                match (before, after) {
                    (Some(a), Some(b)) => changes.push(format!("selinux ({a} → {b})")),
                    (Some(_), None) => changes.push("selinux removed".to_string()),
                    (None, Some(_)) => changes.push("selinux added".to_string()),
                    (None, None) => {}
                }
            }
            if old.xattrs != new.xattrs {
                changes.push(xattr_delta(old.xattrs.as_ref(), new.xattrs.as_ref()));
            }
        }
    }
}

fn label(meta: &ExtendedMetadata) -> Option<&str> {
    meta.security_label
        .as_ref()
        .and_then(|l| l.get(LABEL_KEY))
        .map(String::as_str)
}

fn xattr_delta(
    old: Option<&BTreeMap<String, String>>,
    new: Option<&BTreeMap<String, String>>,
) -> String {
    let empty = BTreeMap::new();
    let old = old.unwrap_or(&empty);
    let new = new.unwrap_or(&empty);

    let added = new.keys().filter(|k| !old.contains_key(*k)).count();
    let removed = old.keys().filter(|k| !new.contains_key(*k)).count();
    let modified = new
        .iter()
        .filter(|(k, v)| old.get(*k).is_some_and(|o| o != *v))
        .count();

    format!("xattrs (+{added} -{removed} ~{modified})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn file(hash: &str, size: u64) -> FileRecord {
        let when = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut record = FileRecord::new_file("/etc/motd", size, 0o100_644, when);
        record.hash = hash.to_string();
        record
    }

    fn meta(uid: u32, extended: Option<ExtendedMetadata>) -> Option<PlatformMetadata> {
        Some(PlatformMetadata {
            owner_id: uid,
            group_id: 0,
            permissions: 0o644,
            extended,
        })
    }

    #[test]
    fn test_file_mtime_alone_is_not_a_change() {
        let old = file("aa", 1);
        let mut new = old.clone();
        new.modified = old.modified + chrono::Duration::seconds(30);
        assert!(records_equal(&old, &new));
    }

    #[test]
    fn test_directory_mtime_is_a_change() {
        let when = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let old = FileRecord::new_directory("/etc", 0o040_755, when);
        let mut new = old.clone();
        new.modified = when + chrono::Duration::seconds(1);
        assert!(!records_equal(&old, &new));
        assert_eq!(
            describe_changes(&old, &new),
            vec!["mtime (2024-01-02 03:04:05 → 2024-01-02 03:04:06)"]
        );
    }

    #[test]
    fn test_type_change_is_never_equal() {
        let when = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let dir = FileRecord::new_directory("/x", 0o040_755, when);
        let mut f = FileRecord::new_file("/x", 0, 0o100_755, when);
        f.hash = String::new();
        assert!(!records_equal(&dir, &f));
        assert!(!records_equal(&f, &dir));
    }

    #[test]
    fn test_tag_order() {
        let old = file("aa", 1);
        let mut new = file("bb", 2);
        new.mode = 0o100_600;
        let changes = describe_changes(&old, &new);
        assert_eq!(
            changes,
            vec!["content", "size (1 → 2)", "permissions (-rw-r--r-- → -rw-------)"]
        );
    }

    #[test]
    fn test_content_needs_both_hashes() {
        let old = file("", 1);
        let new = file("bb", 1);
        assert!(!records_equal(&old, &new));
        assert_eq!(describe_changes(&old, &new), vec!["unknown"]);
    }

    #[test]
    fn test_ownership_and_metadata_presence() {
        let old = file("aa", 1).with_metadata(meta(0, None));
        let new = file("aa", 1).with_metadata(meta(1000, None));
        assert_eq!(describe_changes(&old, &new), vec!["uid (0 → 1000)"]);

        let bare = file("aa", 1);
        assert_eq!(describe_changes(&bare, &old), vec!["metadata"]);
    }

    #[test]
    fn test_selinux_and_xattr_tags() {
        let label = |l: &str| {
            let mut m = BTreeMap::new();
            m.insert(LABEL_KEY.to_string(), l.to_string());
            Some(m)
        };
        let attrs = |pairs: &[(&str, &str)]| {
            Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            )
        };

        let old = file("aa", 1).with_metadata(meta(
            0,
            Some(ExtendedMetadata {
                security_label: label("system_u:object_r:etc_t:s0"),
                xattrs: attrs(&[("user.a", "1"), ("user.b", "2")]),
            }),
        ));
        let new = file("aa", 1).with_metadata(meta(
            0,
            Some(ExtendedMetadata {
                security_label: label("system_u:object_r:shadow_t:s0"),
                xattrs: attrs(&[("user.a", "9"), ("user.c", "3")]),
            }),
        ));
        assert_eq!(
            describe_changes(&old, &new),
            vec![
                "selinux (system_u:object_r:etc_t:s0 → system_u:object_r:shadow_t:s0)",
                "xattrs (+1 -1 ~1)",
            ]
        );

        let plain = file("aa", 1).with_metadata(meta(0, None));
        assert_eq!(
            describe_changes(&plain, &new),
            vec!["selinux added", "xattrs added (2)"]
        );
        assert_eq!(
            describe_changes(&old, &plain),
            vec!["selinux removed", "xattrs removed (2)"]
        );
    }
}
