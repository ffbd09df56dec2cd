//! Snapshot store errors.

use std::path::PathBuf;

use fsdelta_core::ValidationError;
use thiserror::Error;

/// Failures while saving or loading a snapshot file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The output file could not be created.
    #[error("failed to create snapshot file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file could not be opened.
    #[error("failed to open snapshot file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing or compressing failed.
    #[error("failed to write snapshot file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the framing failed (including truncation).
    #[error("failed to read snapshot file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serializing the snapshot failed.
    #[error("failed to encode snapshot: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },

    /// Decompressing or deserializing a frame failed.
    #[error("failed to decode snapshot: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },

    /// The file does not start with the snapshot magic.
    #[error("not a snapshot file: {path}")]
    BadMagic { path: PathBuf },

    /// The file uses a format version this build cannot read.
    #[error("unsupported snapshot format version {found}")]
    UnsupportedFormat { found: u32 },

    /// The header frame length is implausible.
    #[error("snapshot header frame too large: {len} bytes")]
    HeaderTooLarge { len: u64 },

    /// The decoded snapshot failed validation.
    #[error("invalid snapshot: {0}")]
    Invalid(#[from] ValidationError),
}
