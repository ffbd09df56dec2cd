//! Scan and diff configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::filter::PathFilter;

/// Default number of directory workers.
pub const DEFAULT_DIR_WORKERS: usize = 4;

/// Default per-worker read buffer size (256 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// Default capacity of the pending-directory queue.
pub const DEFAULT_DIR_QUEUE_CAPACITY: usize = 1000;

/// Configuration for scanning operations.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root path to scan.
    pub root: PathBuf,

    /// Extra ignore patterns, see [`PathFilter`].
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Include the built-in ignore patterns.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub use_default_ignores: bool,

    /// Number of file hashing workers (0 = twice the available parallelism).
    #[builder(default = "0")]
    #[serde(default)]
    pub workers: usize,

    /// Number of directory enumeration workers.
    #[builder(default = "DEFAULT_DIR_WORKERS")]
    #[serde(default = "default_dir_workers")]
    pub dir_workers: usize,

    /// Read buffer size per hashing worker.
    #[builder(default = "DEFAULT_BUFFER_SIZE")]
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Capacity of the pending-directory queue.
    #[builder(default = "DEFAULT_DIR_QUEUE_CAPACITY")]
    #[serde(default = "default_dir_queue_capacity")]
    pub dir_queue_capacity: usize,

    /// Capacity of the file job queue (0 = four jobs per worker).
    #[builder(default = "0")]
    #[serde(default)]
    pub file_queue_capacity: usize,

    /// Collect ownership, permissions and extended attributes.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub collect_metadata: bool,
}

fn default_true() -> bool {
    true
}

fn default_dir_workers() -> usize {
    DEFAULT_DIR_WORKERS
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_dir_queue_capacity() -> usize {
    DEFAULT_DIR_QUEUE_CAPACITY
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if self.dir_workers == Some(0) {
            return Err("dir_workers must be at least 1".to_string());
        }
        if self.buffer_size == Some(0) {
            return Err("buffer_size must be non-zero".to_string());
        }
        if self.dir_queue_capacity == Some(0) {
            return Err("dir_queue_capacity must be non-zero".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a config with default settings for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_patterns: Vec::new(),
            use_default_ignores: true,
            workers: 0,
            dir_workers: DEFAULT_DIR_WORKERS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            dir_queue_capacity: DEFAULT_DIR_QUEUE_CAPACITY,
            file_queue_capacity: 0,
            collect_metadata: true,
        }
    }

    /// Check a config that did not go through the builder (e.g. deserialized).
    pub fn validate(&self) -> Result<(), ScanError> {
        let invalid = |message: &str| ScanError::InvalidConfig {
            message: message.to_string(),
        };
        if self.root.as_os_str().is_empty() {
            return Err(invalid("Root path cannot be empty"));
        }
        if self.dir_workers == 0 {
            return Err(invalid("dir_workers must be at least 1"));
        }
        if self.buffer_size == 0 {
            return Err(invalid("buffer_size must be non-zero"));
        }
        if self.dir_queue_capacity == 0 {
            return Err(invalid("dir_queue_capacity must be non-zero"));
        }
        Ok(())
    }

    /// Hashing worker count with the auto setting resolved.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism().map_or(2, |n| n.get() * 2)
        }
    }

    /// File job queue capacity with the auto setting resolved.
    pub fn effective_file_queue_capacity(&self) -> usize {
        if self.file_queue_capacity > 0 {
            self.file_queue_capacity
        } else {
            self.effective_workers() * 4
        }
    }

    /// Build the path filter for this config.
    pub fn path_filter(&self) -> PathFilter {
        PathFilter::build(self.use_default_ignores, &self.ignore_patterns)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new("/")
    }
}

/// Configuration for comparing snapshots.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct DiffConfig {
    /// Paths matching any of these patterns are left out of the diff.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Report no changes without comparing records when root digests match.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub use_root_digest: bool,
}

impl DiffConfig {
    /// Create a new diff config builder.
    pub fn builder() -> DiffConfigBuilder {
        DiffConfigBuilder::default()
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            use_root_digest: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::builder()
            .root("/home/user")
            .workers(4usize)
            .collect_metadata(false)
            .build()
            .unwrap();

        assert_eq!(config.root, PathBuf::from("/home/user"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.dir_workers, DEFAULT_DIR_WORKERS);
        assert_eq!(config.effective_file_queue_capacity(), 16);
        assert!(!config.collect_metadata);
        assert!(config.use_default_ignores);
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(ScanConfig::builder().build().is_err());
        assert!(ScanConfig::builder().root("").build().is_err());
        assert!(
            ScanConfig::builder()
                .root("/x")
                .dir_workers(0usize)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = ScanConfig::new("/srv");
        assert_eq!(config.buffer_size, 256 * 1024);
        assert_eq!(config.dir_queue_capacity, 1000);
        assert!(config.effective_workers() >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialized_config_fills_defaults() {
        let config: ScanConfig = serde_json::from_str(r#"{"root": "/etc"}"#).unwrap();
        assert!(config.use_default_ignores);
        assert!(config.collect_metadata);
        assert_eq!(config.dir_workers, DEFAULT_DIR_WORKERS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_path_filter_from_config() {
        let mut config = ScanConfig::new("/");
        config.ignore_patterns = vec!["*.log".to_string()];
        assert!(config.path_filter().should_ignore("/var/app/x.log"));
        assert!(config.path_filter().should_ignore("/proc/1"));

        config.use_default_ignores = false;
        assert!(!config.path_filter().should_ignore("/proc/1"));
    }

    #[test]
    fn test_diff_config_defaults() {
        let config = DiffConfig::default();
        assert!(config.use_root_digest);
        let built = DiffConfig::builder().build().unwrap();
        assert!(built.use_root_digest);
        assert!(built.ignore_patterns.is_empty());
    }
}
