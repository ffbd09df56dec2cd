//! Scan progress reporting.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of collected entries between progress broadcasts.
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Progress information during a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    /// Files (including symlinks and special files) collected so far.
    pub files_scanned: u64,
    /// Directories collected so far.
    pub dirs_scanned: u64,
    /// Bytes of file content covered so far.
    pub bytes_scanned: u64,
    /// Most recently collected path.
    pub current_path: PathBuf,
    /// Per-entry failures so far.
    pub errors_count: u64,
    /// Time elapsed since the scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        rate(self.files_scanned, self.elapsed)
    }

    /// Calculate scan rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        rate(self.bytes_scanned, self.elapsed)
    }

    /// Get total items scanned (files + dirs).
    pub fn total_items(&self) -> u64 {
        self.files_scanned + self.dirs_scanned
    }
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

/// Shared scan counters, bumped by the result collector.
#[derive(Debug)]
pub(crate) struct ScanCounters {
    start: Instant,
    files: AtomicU64,
    dirs: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
}

impl ScanCounters {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            files: AtomicU64::new(0),
            dirs: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Count a file record; returns the new total of collected entries.
    pub fn record_file(&self, size: u64) -> u64 {
        self.bytes.fetch_add(size, Ordering::Relaxed);
        self.files.fetch_add(1, Ordering::Relaxed) + 1 + self.dirs.load(Ordering::Relaxed)
    }

    /// Count a directory record; returns the new total of collected entries.
    pub fn record_dir(&self) -> u64 {
        self.dirs.fetch_add(1, Ordering::Relaxed) + 1 + self.files.load(Ordering::Relaxed)
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    pub fn dirs(&self) -> u64 {
        self.dirs.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn progress(&self, current_path: PathBuf) -> ScanProgress {
        ScanProgress {
            files_scanned: self.files(),
            dirs_scanned: self.dirs(),
            bytes_scanned: self.bytes(),
            current_path,
            errors_count: self.errors(),
            elapsed: self.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let counters = ScanCounters::new(Instant::now());
        assert_eq!(counters.record_dir(), 1);
        assert_eq!(counters.record_file(10), 2);
        assert_eq!(counters.record_file(5), 3);
        counters.record_error();

        let progress = counters.progress(PathBuf::from("/x"));
        assert_eq!(progress.files_scanned, 2);
        assert_eq!(progress.dirs_scanned, 1);
        assert_eq!(progress.bytes_scanned, 15);
        assert_eq!(progress.errors_count, 1);
        assert_eq!(progress.total_items(), 3);
    }

    #[test]
    fn test_rates_with_zero_elapsed() {
        let progress = ScanProgress {
            files_scanned: 10,
            ..Default::default()
        };
        assert_eq!(progress.files_per_second(), 0.0);
        assert_eq!(progress.bytes_per_second(), 0.0);
    }
}
