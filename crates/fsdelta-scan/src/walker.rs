//! Concurrent directory tree walker.
//!
//! Two worker pools connected by bounded channels:
//!
//! - directory workers list directories, emit directory, symlink and special
//!   file records directly, and queue regular files as hash jobs;
//! - file workers hash queued files and emit their records.
//!
//! Subdirectories go back onto the directory queue. When that queue is full the
//! discovering worker keeps the subdirectory on its own stack and lists it
//! itself, so a saturated queue never blocks a directory worker.

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::thread;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace};

use fsdelta_core::{
    ERROR_HASH, FileRecord, PathFilter, ScanError, ScanWarning, WarningKind, path_key,
};

use crate::hasher::{ContentHasher, hash_special, hash_symlink};
use crate::metadata::MetadataProvider;

/// Output of a walk, delivered to the result sink.
#[derive(Debug)]
pub enum WalkEvent {
    /// A finished record.
    Record(FileRecord),
    /// A per-entry failure; never fatal to the walk.
    Warning(ScanWarning),
}

/// Pool sizes and queue capacities for a walk.
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    /// Directory listing workers.
    pub dir_workers: usize,
    /// File hashing workers.
    pub file_workers: usize,
    /// Capacity of the pending-directory queue.
    pub dir_queue_capacity: usize,
    /// Capacity of the file job queue.
    pub file_queue_capacity: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        let file_workers = std::thread::available_parallelism().map_or(2, |n| n.get() * 2);
        Self {
            dir_workers: fsdelta_core::DEFAULT_DIR_WORKERS,
            file_workers,
            dir_queue_capacity: fsdelta_core::DEFAULT_DIR_QUEUE_CAPACITY,
            file_queue_capacity: file_workers * 4,
        }
    }
}

struct FileJob {
    path: PathBuf,
    record: FileRecord,
}

/// State shared by the directory workers of one walk.
struct DirQueue {
    tx: RwLock<Option<Sender<PathBuf>>>,
    rx: Receiver<PathBuf>,
    /// Directories queued or being listed.
    active: AtomicUsize,
}

impl DirQueue {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            tx: RwLock::new(Some(tx)),
            rx,
            active: AtomicUsize::new(0),
        }
    }

    /// Queue a directory, or hand it back if the queue is full or closed.
    fn push(&self, dir: PathBuf) -> Result<(), PathBuf> {
        let guard = self.tx.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(dir);
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        tx.try_send(dir).map_err(|err| {
            self.active.fetch_sub(1, Ordering::SeqCst);
            err.into_inner()
        })
    }

    /// Mark one queued directory as fully processed.
    fn finish(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.close();
        }
    }

    fn close(&self) {
        let closed = self
            .tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if closed.is_some() {
            trace!("directory queue drained and closed");
        }
    }
}

/// Walks a tree, filtering, hashing and describing every entry beneath the root.
pub struct TreeWalker<'a> {
    filter: &'a PathFilter,
    hasher: &'a ContentHasher,
    metadata: Option<&'a dyn MetadataProvider>,
    options: WalkOptions,
}

impl<'a> TreeWalker<'a> {
    /// Create a walker.
    pub fn new(filter: &'a PathFilter, hasher: &'a ContentHasher, options: WalkOptions) -> Self {
        Self {
            filter,
            hasher,
            metadata: None,
            options,
        }
    }

    /// Attach a platform metadata provider.
    pub fn with_metadata(mut self, provider: &'a dyn MetadataProvider) -> Self {
        self.metadata = Some(provider);
        self
    }

    /// Walk everything beneath `root`, sending results to `sink`.
    ///
    /// Returns once every worker has finished. The root itself is not
    /// reported. Only an unreadable root fails the walk.
    pub fn walk(&self, root: &Path, sink: Sender<WalkEvent>) -> Result<(), ScanError> {
        fs::read_dir(root).map_err(|e| ScanError::io(root, e))?;

        let dirs = DirQueue::new(self.options.dir_queue_capacity);
        if let Err(dir) = dirs.push(root.to_path_buf()) {
            // Capacity is at least one, so this only happens if the queue closed.
            return Err(ScanError::io(
                dir,
                std::io::Error::other("directory queue unavailable"),
            ));
        }

        let (file_tx, file_rx) =
            crossbeam_channel::bounded::<FileJob>(self.options.file_queue_capacity.max(1));

        let dir_workers = self.options.dir_workers.max(1);
        let file_workers = self.options.file_workers.max(1);
        debug!(dir_workers, file_workers, root = %root.display(), "starting walk");

        thread::scope(|s| {
            for _ in 0..dir_workers {
                let file_tx = file_tx.clone();
                let sink = sink.clone();
                let dirs = &dirs;
                s.spawn(move || self.dir_worker(dirs, &file_tx, &sink));
            }
            // File workers stop once every directory worker has dropped its sender.
            drop(file_tx);

            for _ in 0..file_workers {
                let file_rx = file_rx.clone();
                let sink = sink.clone();
                s.spawn(move || self.file_worker(&file_rx, &sink));
            }
        });

        Ok(())
    }

    fn dir_worker(&self, dirs: &DirQueue, file_tx: &Sender<FileJob>, sink: &Sender<WalkEvent>) {
        let mut stack = Vec::new();
        while let Ok(dir) = dirs.rx.recv() {
            stack.push(dir);
            while let Some(dir) = stack.pop() {
                self.list_directory(&dir, dirs, &mut stack, file_tx, sink);
            }
            dirs.finish();
        }
    }

    fn file_worker(&self, jobs: &Receiver<FileJob>, sink: &Sender<WalkEvent>) {
        for FileJob { path, mut record } in jobs.iter() {
            match self.hasher.hash_file(&path, record.size) {
                Ok(hash) => record.hash = hash,
                Err(err) => {
                    record.hash = ERROR_HASH.to_string();
                    let _ = sink.send(WalkEvent::Warning(ScanWarning::hash_error(&path, &err)));
                }
            }
            let _ = sink.send(WalkEvent::Record(record));
        }
    }

    fn list_directory(
        &self,
        dir: &Path,
        dirs: &DirQueue,
        stack: &mut Vec<PathBuf>,
        file_tx: &Sender<FileJob>,
        sink: &Sender<WalkEvent>,
    ) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                let _ = sink.send(WalkEvent::Warning(ScanWarning::from_io(
                    dir,
                    &err,
                    WarningKind::ReadError,
                )));
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let _ = sink.send(WalkEvent::Warning(ScanWarning::from_io(
                        dir,
                        &err,
                        WarningKind::ReadError,
                    )));
                    continue;
                }
            };

            let path = entry.path();
            let key = path_key(&path);
            if self.filter.should_ignore(&key) {
                continue;
            }

            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    let _ = sink.send(WalkEvent::Warning(ScanWarning::from_io(
                        &path,
                        &err,
                        WarningKind::MetadataError,
                    )));
                    continue;
                }
            };

            let platform = self.metadata.and_then(|p| p.collect(&path, &metadata));
            let file_type = metadata.file_type();
            let mode = mode_bits(&metadata);
            let modified = modified_time(&metadata);

            if file_type.is_dir() {
                let record = FileRecord::new_directory(key, mode, modified).with_metadata(platform);
                let _ = sink.send(WalkEvent::Record(record));
                if let Err(path) = dirs.push(path) {
                    stack.push(path);
                }
            } else if file_type.is_file() {
                let record = FileRecord::new_file(key, metadata.len(), mode, modified)
                    .with_metadata(platform);
                let _ = file_tx.send(FileJob { path, record });
            } else {
                let mut record = FileRecord::new_file(key, metadata.len(), mode, modified)
                    .with_metadata(platform);
                if file_type.is_symlink() {
                    match hash_symlink(&path) {
                        Ok(hash) => record.hash = hash,
                        Err(err) => {
                            record.hash = ERROR_HASH.to_string();
                            let _ = sink
                                .send(WalkEvent::Warning(ScanWarning::hash_error(&path, &err)));
                        }
                    }
                } else {
                    record.hash = hash_special(special_kind(&metadata));
                }
                let _ = sink.send(WalkEvent::Record(record));
            }
        }
    }
}

fn modified_time(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_default()
}

#[cfg(unix)]
fn mode_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode()
}

#[cfg(not(unix))]
fn mode_bits(metadata: &Metadata) -> u32 {
    let kind = if metadata.is_dir() {
        0o040_000
    } else if metadata.file_type().is_symlink() {
        0o120_000
    } else {
        0o100_000
    };
    let perms = match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    };
    kind | perms
}

#[cfg(unix)]
fn special_kind(metadata: &Metadata) -> &'static str {
    use std::os::unix::fs::FileTypeExt;
    let ft = metadata.file_type();
    if ft.is_fifo() {
        "fifo"
    } else if ft.is_socket() {
        "socket"
    } else if ft.is_char_device() {
        "char-device"
    } else if ft.is_block_device() {
        "block-device"
    } else {
        "unknown"
    }
}

#[cfg(not(unix))]
fn special_kind(_metadata: &Metadata) -> &'static str {
    "unknown"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn walk_collect(root: &Path, options: WalkOptions) -> (HashMap<String, FileRecord>, usize) {
        let filter = PathFilter::without_defaults::<&str>(&[]);
        let hasher = ContentHasher::default();
        let walker = TreeWalker::new(&filter, &hasher, options);

        let (tx, rx) = crossbeam_channel::unbounded();
        walker.walk(root, tx).unwrap();

        let mut records = HashMap::new();
        let mut warnings = 0;
        for event in rx.iter() {
            match event {
                WalkEvent::Record(r) => {
                    records.insert(r.path.clone(), r);
                }
                WalkEvent::Warning(_) => warnings += 1,
            }
        }
        (records, warnings)
    }

    fn deep_tree(levels: usize, fanout: usize) -> TempDir {
        let temp = TempDir::new().unwrap();
        let mut frontier = vec![temp.path().to_path_buf()];
        for _ in 0..levels {
            let mut next = Vec::new();
            for dir in &frontier {
                for i in 0..fanout {
                    let child = dir.join(format!("d{i}"));
                    fs::create_dir(&child).unwrap();
                    fs::write(child.join("f.txt"), format!("{}", child.display())).unwrap();
                    next.push(child);
                }
            }
            frontier = next;
        }
        temp
    }

    #[test]
    fn test_walk_emits_every_entry_once() {
        let temp = deep_tree(3, 3);
        let (records, warnings) = walk_collect(temp.path(), WalkOptions::default());

        // 3 + 9 + 27 directories, one file in each.
        let dirs = records.values().filter(|r| r.is_dir).count();
        let files = records.values().filter(|r| !r.is_dir).count();
        assert_eq!(dirs, 39);
        assert_eq!(files, 39);
        assert_eq!(warnings, 0);
        assert!(!records.contains_key(&temp.path().to_string_lossy().into_owned()));
        assert!(records.values().filter(|r| !r.is_dir).all(|r| r.has_hash()));
    }

    #[test]
    fn test_saturated_queue_falls_back_inline() {
        let temp = deep_tree(3, 4);
        let options = WalkOptions {
            dir_workers: 2,
            file_workers: 1,
            dir_queue_capacity: 1,
            file_queue_capacity: 1,
        };
        let (records, _) = walk_collect(temp.path(), options);
        assert_eq!(records.values().filter(|r| r.is_dir).count(), 4 + 16 + 64);
        assert_eq!(records.values().filter(|r| !r.is_dir).count(), 84);
    }

    #[test]
    fn test_unreadable_root_fails() {
        let filter = PathFilter::default();
        let hasher = ContentHasher::default();
        let walker = TreeWalker::new(&filter, &hasher, WalkOptions::default());
        let (tx, _rx) = crossbeam_channel::unbounded();
        assert!(walker.walk(Path::new("/definitely/not/here"), tx).is_err());
    }

    #[test]
    fn test_filtered_directories_are_not_descended() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("keep")).unwrap();
        fs::create_dir_all(temp.path().join("skip/inner")).unwrap();
        fs::write(temp.path().join("skip/inner/x"), "x").unwrap();
        fs::write(temp.path().join("keep/y"), "y").unwrap();

        let filter = PathFilter::without_defaults(&["*/skip"]);
        let hasher = ContentHasher::default();
        let walker = TreeWalker::new(&filter, &hasher, WalkOptions::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        walker.walk(temp.path(), tx).unwrap();

        let paths: Vec<String> = rx
            .iter()
            .filter_map(|e| match e {
                WalkEvent::Record(r) => Some(r.path),
                WalkEvent::Warning(_) => None,
            })
            .collect();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| !p.contains("skip")));
    }
}
