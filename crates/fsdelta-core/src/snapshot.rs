//! Snapshot container, headers and statistics.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::digest::{DigestSummary, compute_root};
use crate::error::{ScanWarning, ValidationError};
use crate::record::FileRecord;

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Aggregate statistics for a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Number of non-directory records.
    pub file_count: u64,
    /// Number of directory records.
    pub dir_count: u64,
    /// Sum of file sizes in bytes.
    pub total_size: u64,
    /// Per-entry failures encountered during the scan.
    pub error_count: u64,
    /// Wall time of the scan.
    pub scan_duration: Duration,
}

impl ScanStats {
    /// Derive counts and sizes from a record map.
    ///
    /// `error_count` and `scan_duration` are not derivable and are left at zero.
    pub fn from_records(files: &HashMap<String, FileRecord>) -> Self {
        let mut stats = Self::default();
        for record in files.values() {
            if record.is_dir {
                stats.dir_count += 1;
            } else {
                stats.file_count += 1;
                stats.total_size += record.size;
            }
        }
        stats
    }

    /// Total number of entries.
    pub fn total_entries(&self) -> u64 {
        self.file_count + self.dir_count
    }

    /// Files per second over the scan duration.
    pub fn files_per_second(&self) -> f64 {
        let secs = self.scan_duration.as_secs_f64();
        if secs > 0.0 {
            self.file_count as f64 / secs
        } else {
            0.0
        }
    }
}

/// Description of the machine and scan that produced a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// When the scan started.
    pub timestamp: DateTime<Utc>,
    /// Host name.
    pub hostname: String,
    /// Operating system family (e.g. `linux`).
    pub os: String,
    /// CPU architecture (e.g. `x86_64`).
    pub arch: String,
    /// Distribution or product name.
    pub distro: String,
    /// Kernel version.
    pub kernel_version: String,
    /// Root of the scan.
    pub scan_root: String,
    /// Version of the tool that wrote the snapshot.
    pub tool_version: String,
    /// Logical CPUs available.
    pub cpu_count: usize,
}

impl SystemInfo {
    /// Minimal system info for a scan root, with everything else unknown.
    pub fn new(scan_root: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            hostname: hostname.into(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            distro: String::new(),
            kernel_version: String::new(),
            scan_root: scan_root.into(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            cpu_count: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hostname: {}", self.hostname)?;
        writeln!(f, "OS: {}", self.os)?;
        writeln!(f, "Arch: {}", self.arch)?;
        writeln!(f, "Distro: {}", self.distro)?;
        writeln!(f, "Kernel Version: {}", self.kernel_version)?;
        writeln!(f, "Timestamp: {}", self.timestamp.to_rfc3339())?;
        write!(f, "Scan Root: {}", self.scan_root)
    }
}

/// Everything about a snapshot except its record map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Snapshot format version.
    pub version: String,
    /// When the snapshot was taken.
    pub created: DateTime<Utc>,
    /// System description.
    pub system: SystemInfo,
    /// Aggregate statistics.
    pub stats: ScanStats,
    /// Root digest over all (path, hash) pairs.
    pub root_digest: u64,
    /// Quick-inspection digest summary.
    pub digest_summary: DigestSummary,
}

/// A complete, timestamped record of a filesystem subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version.
    pub version: String,
    /// System description.
    pub system: SystemInfo,
    /// Records keyed by absolute path.
    pub files: HashMap<String, FileRecord>,
    /// Aggregate statistics.
    pub stats: ScanStats,
    /// Root digest over all (path, hash) pairs; 0 when there is no content.
    pub root_digest: u64,
    /// Quick-inspection digest summary.
    pub digest_summary: DigestSummary,
    /// Warnings from the scan that produced this snapshot (not persisted).
    #[serde(skip)]
    pub warnings: Vec<ScanWarning>,
}

impl Snapshot {
    /// Build a snapshot from collected records, computing the root digest.
    ///
    /// Counters in `stats` that disagree with `files` are replaced by the
    /// values derived from the map; duration and error count are kept.
    pub fn new(
        system: SystemInfo,
        files: HashMap<String, FileRecord>,
        stats: ScanStats,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        let root_digest = compute_root(&files);
        let digest_summary = DigestSummary::new(root_digest, &files);
        let mut snapshot = Self {
            version: SNAPSHOT_VERSION.to_string(),
            system,
            files,
            stats,
            root_digest,
            digest_summary,
            warnings,
        };
        snapshot.recompute_stats();
        snapshot
    }

    /// Reassemble a snapshot from a stored header and record map.
    pub fn from_header(header: SnapshotHeader, files: HashMap<String, FileRecord>) -> Self {
        Self {
            version: header.version,
            system: header.system,
            files,
            stats: header.stats,
            root_digest: header.root_digest,
            digest_summary: header.digest_summary,
            warnings: Vec::new(),
        }
    }

    /// Header view of this snapshot.
    pub fn header(&self) -> SnapshotHeader {
        SnapshotHeader {
            version: self.version.clone(),
            created: self.system.timestamp,
            system: self.system.clone(),
            stats: self.stats.clone(),
            root_digest: self.root_digest,
            digest_summary: self.digest_summary.clone(),
        }
    }

    /// Look up a record by path.
    pub fn record(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Check if any per-entry warnings were recorded during the scan.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Recompute file/dir counts and total size from the record map.
    ///
    /// Returns `true` if the stored statistics had to be corrected.
    pub fn recompute_stats(&mut self) -> bool {
        let actual = ScanStats::from_records(&self.files);
        let mut corrected = false;

        if actual.file_count != self.stats.file_count {
            warn!(
                expected = self.stats.file_count,
                actual = actual.file_count,
                "file count mismatch, correcting"
            );
            self.stats.file_count = actual.file_count;
            corrected = true;
        }

        if actual.dir_count != self.stats.dir_count {
            warn!(
                expected = self.stats.dir_count,
                actual = actual.dir_count,
                "directory count mismatch, correcting"
            );
            self.stats.dir_count = actual.dir_count;
            corrected = true;
        }

        if actual.total_size != self.stats.total_size {
            warn!(
                expected = self.stats.total_size,
                actual = actual.total_size,
                "total size mismatch, correcting"
            );
            self.stats.total_size = actual.total_size;
            corrected = true;
        }

        corrected
    }

    /// Validate structural invariants, repairing count mismatches in place.
    ///
    /// Returns `true` if statistics were corrected.
    pub fn validate(&mut self) -> Result<bool, ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::MissingVersion);
        }
        if self.system.hostname.is_empty() {
            return Err(ValidationError::MissingHostname);
        }
        if self.files.is_empty() {
            return Err(ValidationError::EmptyFileMap);
        }
        if self.stats.file_count == 0 && self.stats.dir_count == 0 {
            return Err(ValidationError::NoEntries);
        }
        Ok(self.recompute_stats())
    }

    /// Check that the stored root digest matches the records.
    pub fn verify_digest(&self) -> Result<(), ValidationError> {
        let computed = compute_root(&self.files);
        if computed != self.root_digest {
            return Err(ValidationError::DigestMismatch {
                stored: self.root_digest,
                computed,
            });
        }
        Ok(())
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "Snapshot: {}@{} ({} files, {} dirs, {} bytes, scan took {:.1}s)",
            self.system.hostname,
            self.system.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.stats.file_count,
            self.stats.dir_count,
            self.stats.total_size,
            self.stats.scan_duration.as_secs_f64(),
        )
    }
}
