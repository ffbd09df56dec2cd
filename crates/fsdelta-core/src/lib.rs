//! Core types for fsdelta.
//!
//! This crate provides the data structures shared by the scanner, the
//! snapshot store and the diff engine: file records, snapshots, scan and
//! diff configuration, the scan-time path filter and the root digest.

mod config;
pub mod digest;
mod error;
mod filter;
mod record;
mod snapshot;

pub use config::{
    DEFAULT_BUFFER_SIZE, DEFAULT_DIR_QUEUE_CAPACITY, DEFAULT_DIR_WORKERS, DiffConfig,
    DiffConfigBuilder, ScanConfig, ScanConfigBuilder,
};
pub use digest::{DigestSummary, compute_root};
pub use error::{PartialScanError, ScanError, ScanWarning, ValidationError, WarningKind};
pub use filter::{DEFAULT_IGNORE_PATTERNS, PathFilter};
pub use record::{
    EMPTY_HASH, EMPTY_HASH_VALUE, ERROR_HASH, ExtendedMetadata, FileRecord, PlatformMetadata,
    format_hash, mode_string, path_key,
};
pub use snapshot::{SNAPSHOT_VERSION, ScanStats, Snapshot, SnapshotHeader, SystemInfo};
