//! Error types for scanning and snapshot validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::Snapshot;

/// Errors that fail a whole scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// A walk-level failure together with whatever was collected before it.
#[derive(Debug, Error)]
#[error("scan failed: {source}")]
pub struct PartialScanError {
    /// The error that stopped the walk.
    #[source]
    pub source: ScanError,
    /// Records, stats and digest gathered up to the failure.
    pub snapshot: Box<Snapshot>,
}

impl PartialScanError {
    /// Create a partial scan error.
    pub fn new(source: ScanError, snapshot: Snapshot) -> Self {
        Self {
            source,
            snapshot: Box::new(snapshot),
        }
    }

    /// Discard the error and keep the partial snapshot.
    pub fn into_snapshot(self) -> Snapshot {
        *self.snapshot
    }
}

/// Structural problems that make a snapshot unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The snapshot carries no format version.
    #[error("missing snapshot version")]
    MissingVersion,

    /// The snapshot carries no hostname.
    #[error("missing system hostname")]
    MissingHostname,

    /// The record map is empty.
    #[error("snapshot contains no files")]
    EmptyFileMap,

    /// The stored statistics claim neither files nor directories.
    #[error("invalid statistics: no files or directories")]
    NoEntries,

    /// The stored root digest does not match the records.
    #[error("root digest mismatch: stored {stored:016x}, computed {computed:016x}")]
    DigestMismatch { stored: u64, computed: u64 },
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading a directory listing.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// File content could not be hashed.
    HashError,
}

/// Non-fatal problem encountered during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from an I/O error, classifying permission failures.
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error, kind: WarningKind) -> Self {
        let path = path.into();
        let kind = if error.kind() == std::io::ErrorKind::PermissionDenied {
            WarningKind::PermissionDenied
        } else {
            kind
        };
        Self {
            message: format!("{error}"),
            path,
            kind,
        }
    }

    /// Create a hashing failure warning.
    pub fn hash_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        Self {
            message: format!("Hash error: {error}"),
            path,
            kind: WarningKind::HashError,
        }
    }
}
