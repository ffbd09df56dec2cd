//! File system scanning engine for fsdelta.
//!
//! This crate walks a directory tree concurrently, hashes file contents and
//! collects everything into a [`Snapshot`].
//!
//! # Overview
//!
//! - **Parallel traversal** with separate directory and hashing pools
//! - **Size-adaptive hashing** (pooled reads, streaming, mmap)
//! - **Platform metadata** through a pluggable [`MetadataProvider`]
//! - **Progress updates** via broadcast channels
//!
//! # Example
//!
//! ```rust,no_run
//! use fsdelta_scan::{ScanConfig, Scanner};
//!
//! let scanner = Scanner::new(ScanConfig::new("/etc"));
//! let snapshot = scanner.scan().unwrap();
//!
//! println!("Files: {}", snapshot.stats.file_count);
//! println!("Root digest: {:016x}", snapshot.root_digest);
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use fsdelta_scan::{ScanConfig, Scanner};
//!
//! let scanner = Scanner::new(ScanConfig::new("/usr"));
//! let mut progress_rx = scanner.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(progress) = progress_rx.blocking_recv() {
//!         println!("Scanned {} files", progress.files_scanned);
//!     }
//! });
//! ```

pub mod hasher;
pub mod metadata;
mod progress;
mod scanner;
pub mod system;
pub mod walker;

pub use hasher::ContentHasher;
pub use metadata::{MetadataProvider, NoopMetadataProvider, default_provider};
pub use progress::{PROGRESS_INTERVAL, ScanProgress};
pub use scanner::{Scanner, scan};
pub use walker::{TreeWalker, WalkEvent, WalkOptions};

// Re-export core types for convenience
pub use fsdelta_core::{
    PartialScanError, ScanConfig, ScanError, ScanStats, ScanWarning, Snapshot, WarningKind,
};
