//! Per-path file records and platform metadata.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw XXH3 value of an empty input, computed at compile time.
pub const EMPTY_HASH_VALUE: u64 = xxhash_rust::const_xxh3::xxh3_64(&[]);

/// Content hash recorded for every zero-byte file.
///
/// Equal to [`format_hash`] applied to [`EMPTY_HASH_VALUE`].
pub const EMPTY_HASH: &str = "2d06800538d394c2";

/// Sentinel stored in place of a content hash when hashing failed.
pub const ERROR_HASH: &str = "ERROR";

/// Render a 64-bit content hash as fixed-width lowercase hex.
pub fn format_hash(value: u64) -> String {
    format!("{value:016x}")
}

/// Render a path as a record key without losing information.
///
/// Valid UTF-8 is kept as is. On Unix, bytes that are not valid UTF-8 are
/// written as `\xNN` and a literal backslash as `\\`, so distinct paths
/// always produce distinct keys. Other platforms keep their separators
/// untouched and only escape invalid sequences.
pub fn path_key(path: &Path) -> String {
    let bytes = path.as_os_str().as_encoded_bytes();
    let escape_backslash = cfg!(unix);
    if let Ok(text) = std::str::from_utf8(bytes) {
        if !(escape_backslash && text.contains('\\')) {
            return text.to_string();
        }
    }

    let mut key = String::with_capacity(bytes.len() + 8);
    for chunk in bytes.utf8_chunks() {
        for ch in chunk.valid().chars() {
            if escape_backslash && ch == '\\' {
                key.push_str("\\\\");
            } else {
                key.push(ch);
            }
        }
        for byte in chunk.invalid() {
            let _ = write!(key, "\\x{byte:02x}");
        }
    }
    key
}

/// Extended attribute and security label data for a path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedMetadata {
    /// Security label fields (e.g. `label` for SELinux contexts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_label: Option<BTreeMap<String, String>>,
    /// Extended attributes by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xattrs: Option<BTreeMap<String, String>>,
}

impl ExtendedMetadata {
    /// Check if neither labels nor attributes are present.
    pub fn is_empty(&self) -> bool {
        self.security_label.is_none() && self.xattrs.is_none()
    }
}

/// Ownership and permission data supplied by a platform metadata provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformMetadata {
    /// Owning user id.
    pub owner_id: u32,
    /// Owning group id.
    pub group_id: u32,
    /// Permission bits (including setuid/setgid/sticky).
    pub permissions: u32,
    /// Extended attributes and security labels, if any were found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended: Option<ExtendedMetadata>,
}

/// A single file system object captured in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path, unique within a snapshot.
    pub path: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Full mode bits, file type included.
    pub mode: u32,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Whether this record is a directory.
    pub is_dir: bool,
    /// Content hash; empty for directories, [`ERROR_HASH`] on failure.
    pub hash: String,
    /// Platform metadata, when a provider was available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PlatformMetadata>,
}

impl FileRecord {
    /// Create a record for a non-directory entry. The hash is filled in later.
    pub fn new_file(path: impl Into<String>, size: u64, mode: u32, modified: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            size,
            mode,
            modified,
            is_dir: false,
            hash: String::new(),
            metadata: None,
        }
    }

    /// Create a directory record.
    pub fn new_directory(path: impl Into<String>, mode: u32, modified: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            mode,
            modified,
            is_dir: true,
            hash: String::new(),
            metadata: None,
        }
    }

    /// Attach platform metadata.
    pub fn with_metadata(mut self, metadata: Option<PlatformMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check if hashing this entry failed.
    pub fn is_error(&self) -> bool {
        self.hash == ERROR_HASH
    }

    /// Check if this record carries a usable content hash.
    pub fn has_hash(&self) -> bool {
        !self.hash.is_empty() && !self.is_error()
    }

    /// `ls -l` style rendering of the mode bits.
    pub fn mode_string(&self) -> String {
        mode_string(self.mode)
    }
}

const S_IFMT: u32 = 0o170_000;

/// Render Unix mode bits the way `ls -l` does, e.g. `drwxr-xr-x`.
pub fn mode_string(mode: u32) -> String {
    let kind = match mode & S_IFMT {
        0o040_000 => 'd',
        0o120_000 => 'l',
        0o010_000 => 'p',
        0o140_000 => 's',
        0o020_000 => 'c',
        0o060_000 => 'b',
        _ => '-',
    };

    let bit = |mask: u32, c: char| if mode & mask != 0 { c } else { '-' };
    let special = |exec: bool, set: bool, lower: char, upper: char| match (exec, set) {
        (true, true) => lower,
        (false, true) => upper,
        (true, false) => 'x',
        (false, false) => '-',
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    out.push(bit(0o400, 'r'));
    out.push(bit(0o200, 'w'));
    out.push(special(mode & 0o100 != 0, mode & 0o4000 != 0, 's', 'S'));
    out.push(bit(0o040, 'r'));
    out.push(bit(0o020, 'w'));
    out.push(special(mode & 0o010 != 0, mode & 0o2000 != 0, 's', 'S'));
    out.push(bit(0o004, 'r'));
    out.push(bit(0o002, 'w'));
    out.push(special(mode & 0o001 != 0, mode & 0o1000 != 0, 't', 'T'));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hash_constant() {
        assert_eq!(format_hash(EMPTY_HASH_VALUE), EMPTY_HASH);
        assert_eq!(
            format_hash(xxhash_rust::xxh3::xxh3_64(b"")),
            EMPTY_HASH
        );
    }

    #[test]
    fn test_format_hash_width() {
        assert_eq!(format_hash(0), "0000000000000000");
        assert_eq!(format_hash(0xab), "00000000000000ab");
    }

    #[test]
    fn test_path_key_keeps_utf8() {
        assert_eq!(path_key(Path::new("/etc/passwd")), "/etc/passwd");
        assert_eq!(path_key(Path::new("/srv/caf\u{e9}")), "/srv/caf\u{e9}");
    }

    #[cfg(unix)]
    #[test]
    fn test_path_key_escapes_invalid_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let ff = path_key(Path::new(OsStr::from_bytes(b"/tmp/evil\xff")));
        let fe = path_key(Path::new(OsStr::from_bytes(b"/tmp/evil\xfe")));
        assert_eq!(ff, "/tmp/evil\\xff");
        assert_eq!(fe, "/tmp/evil\\xfe");

        // A literal backslash cannot impersonate an escaped byte.
        let literal = path_key(Path::new("/tmp/evil\\xff"));
        assert_eq!(literal, "/tmp/evil\\\\xff");
        assert_ne!(literal, ff);
    }

    #[test]
    fn test_mode_string() {
        assert_eq!(mode_string(0o040_755), "drwxr-xr-x");
        assert_eq!(mode_string(0o100_644), "-rw-r--r--");
        assert_eq!(mode_string(0o104_755), "-rwsr-xr-x");
        assert_eq!(mode_string(0o041_777), "drwxrwxrwt");
        assert_eq!(mode_string(0o120_777), "lrwxrwxrwx");
    }

    #[test]
    fn test_record_hash_state() {
        let now = Utc::now();
        let mut record = FileRecord::new_file("/a", 1, 0o100_644, now);
        assert!(!record.has_hash());

        record.hash = ERROR_HASH.to_string();
        assert!(record.is_error());
        assert!(!record.has_hash());

        record.hash = EMPTY_HASH.to_string();
        assert!(record.has_hash());

        let dir = FileRecord::new_directory("/d", 0o040_755, now);
        assert!(dir.is_dir);
        assert_eq!(dir.size, 0);
        assert!(dir.hash.is_empty());
    }
}
