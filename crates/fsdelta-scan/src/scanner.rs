//! Scan orchestration: walker, hasher and result collection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::Receiver;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use fsdelta_core::{
    FileRecord, PartialScanError, ScanConfig, ScanError, ScanStats, ScanWarning, Snapshot,
};

use crate::hasher::ContentHasher;
use crate::metadata::{MetadataProvider, default_provider};
use crate::progress::{PROGRESS_INTERVAL, ScanCounters, ScanProgress};
use crate::system::{collect_system_info, raise_fd_limit};
use crate::walker::{TreeWalker, WalkEvent, WalkOptions};

/// Builds snapshots of directory trees.
pub struct Scanner {
    config: ScanConfig,
    metadata: Arc<dyn MetadataProvider>,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl Scanner {
    /// Create a new scanner.
    pub fn new(config: ScanConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            config,
            metadata: default_provider(),
            progress_tx,
        }
    }

    /// Replace the platform metadata provider.
    pub fn with_metadata_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = provider;
        self
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// The scanner's configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan the configured root.
    pub fn scan(&self) -> Result<Snapshot, PartialScanError> {
        self.scan_filesystem(&self.config.root)
    }

    /// Scan everything beneath `root`.
    ///
    /// On a walk-level failure the records collected so far are returned
    /// inside the error.
    pub fn scan_filesystem(&self, root: impl AsRef<Path>) -> Result<Snapshot, PartialScanError> {
        let start = Instant::now();
        let requested = root.as_ref();

        if let Err(err) = self.config.validate() {
            return Err(self.empty_partial(requested, err, start));
        }

        let root = match requested.canonicalize() {
            Ok(root) => root,
            Err(err) => return Err(self.empty_partial(requested, ScanError::io(requested, err), start)),
        };
        if !root.is_dir() {
            let err = ScanError::NotADirectory { path: root.clone() };
            return Err(self.empty_partial(&root, err, start));
        }

        if let Some(limit) = raise_fd_limit() {
            debug!(limit, "open file limit");
        }

        let system = collect_system_info(&root);
        let filter = self.config.path_filter();
        let hasher = ContentHasher::new(self.config.buffer_size);
        let options = WalkOptions {
            dir_workers: self.config.dir_workers,
            file_workers: self.config.effective_workers(),
            dir_queue_capacity: self.config.dir_queue_capacity,
            file_queue_capacity: self.config.effective_file_queue_capacity(),
        };

        let mut walker = TreeWalker::new(&filter, &hasher, options);
        if self.config.collect_metadata {
            walker = walker.with_metadata(self.metadata.as_ref());
        }

        info!(root = %root.display(), workers = options.file_workers, "starting scan");

        let counters = ScanCounters::new(start);
        let (tx, rx) = crossbeam_channel::bounded(options.file_workers * 10);

        let (walk_result, (files, warnings)) = thread::scope(|s| {
            let collector = s.spawn(|| self.collect(rx, &counters));
            let walk_result = walker.walk(&root, tx);
            let collected = collector
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (walk_result, collected)
        });

        let stats = ScanStats {
            file_count: counters.files(),
            dir_count: counters.dirs(),
            total_size: counters.bytes(),
            error_count: counters.errors(),
            scan_duration: counters.elapsed(),
        };
        let _ = self.progress_tx.send(counters.progress(root.clone()));

        let snapshot = Snapshot::new(system, files, stats, warnings);

        match walk_result {
            Ok(()) => {
                info!(
                    files = snapshot.stats.file_count,
                    dirs = snapshot.stats.dir_count,
                    bytes = snapshot.stats.total_size,
                    errors = snapshot.stats.error_count,
                    elapsed_ms = snapshot.stats.scan_duration.as_millis() as u64,
                    "scan complete"
                );
                Ok(snapshot)
            }
            Err(err) => {
                warn!(error = %err, records = snapshot.len(), "scan failed, keeping partial results");
                Err(PartialScanError::new(err, snapshot))
            }
        }
    }

    /// Drain walker output into the record map. Runs on a single thread.
    fn collect(
        &self,
        rx: Receiver<WalkEvent>,
        counters: &ScanCounters,
    ) -> (HashMap<String, FileRecord>, Vec<ScanWarning>) {
        let mut files = HashMap::new();
        let mut warnings = Vec::new();

        for event in rx {
            match event {
                WalkEvent::Record(record) => {
                    let collected = if record.is_dir {
                        counters.record_dir()
                    } else {
                        counters.record_file(record.size)
                    };
                    if collected % PROGRESS_INTERVAL == 0 {
                        let _ = self
                            .progress_tx
                            .send(counters.progress(PathBuf::from(&record.path)));
                    }
                    files.insert(record.path.clone(), record);
                }
                WalkEvent::Warning(warning) => {
                    debug!(path = %warning.path.display(), message = %warning.message, "scan warning");
                    counters.record_error();
                    warnings.push(warning);
                }
            }
        }

        (files, warnings)
    }

    fn empty_partial(&self, root: &Path, err: ScanError, start: Instant) -> PartialScanError {
        let stats = ScanStats {
            scan_duration: start.elapsed(),
            ..ScanStats::default()
        };
        let snapshot = Snapshot::new(collect_system_info(root), HashMap::new(), stats, Vec::new());
        PartialScanError::new(err, snapshot)
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}

/// Scan `root` with extra ignore patterns and a hashing worker count
/// (0 = automatic).
pub fn scan(
    root: impl AsRef<Path>,
    ignore_patterns: &[String],
    workers: usize,
) -> Result<Snapshot, PartialScanError> {
    let root = root.as_ref();
    let mut config = ScanConfig::new(root);
    config.ignore_patterns = ignore_patterns.to_vec();
    config.workers = workers;
    Scanner::new(config).scan_filesystem(root)
}
