//! Snapshot comparison.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use itertools::Itertools;
use tracing::{debug, info};

use fsdelta_core::{DiffConfig, FileRecord, Snapshot};

use crate::changes::{describe_changes, records_equal};
use crate::ignore::DiffPathFilter;
use crate::result::{ChangeDetail, DiffResult};

/// Compares snapshots.
#[derive(Debug, Clone)]
pub struct Differ {
    config: DiffConfig,
    filter: DiffPathFilter,
}

impl Differ {
    /// Create a differ with the given configuration.
    pub fn new(config: DiffConfig) -> Self {
        let filter = DiffPathFilter::new(config.ignore_patterns.as_slice());
        Self { config, filter }
    }

    /// The differ's configuration.
    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Compare `baseline` against `current`.
    ///
    /// When root digests are enabled and both snapshots carry the same
    /// non-zero digest, no records are compared and the result is empty.
    /// Such a result does not reflect metadata-only differences, which the
    /// root digest does not cover.
    pub fn compare(&self, baseline: Arc<Snapshot>, current: Arc<Snapshot>) -> DiffResult {
        let start = Instant::now();

        if self.config.use_root_digest
            && baseline.root_digest != 0
            && baseline.root_digest == current.root_digest
        {
            debug!(
                root_digest = %format_args!("{:016x}", baseline.root_digest),
                "root digests match, skipping record comparison"
            );
            return DiffResult::new(
                baseline,
                current,
                BTreeMap::new(),
                BTreeMap::new(),
                BTreeMap::new(),
                start.elapsed(),
            );
        }

        let mut added = BTreeMap::new();
        let mut modified = BTreeMap::new();
        let mut deleted = BTreeMap::new();
        let mut ignored = 0usize;

        let paths = baseline
            .files
            .keys()
            .chain(current.files.keys())
            .unique();

        for path in paths {
            if self.filter.should_ignore(path) {
                ignored += 1;
                continue;
            }
            match (baseline.files.get(path), current.files.get(path)) {
                (None, Some(new)) => {
                    added.insert(path.clone(), new.clone());
                }
                (Some(old), None) => {
                    deleted.insert(path.clone(), old.clone());
                }
                (Some(old), Some(new)) => {
                    if let Some(detail) = compare_records(old, new) {
                        modified.insert(path.clone(), detail);
                    }
                }
                (None, None) => {}
            }
        }

        let result = DiffResult::new(baseline, current, added, modified, deleted, start.elapsed());
        info!(
            added = result.summary.added_count,
            modified = result.summary.modified_count,
            deleted = result.summary.deleted_count,
            ignored,
            elapsed_ms = result.summary.comparison_time.as_millis() as u64,
            "comparison complete"
        );
        result
    }
}

impl Default for Differ {
    fn default() -> Self {
        Self::new(DiffConfig::default())
    }
}

fn compare_records(old: &FileRecord, new: &FileRecord) -> Option<ChangeDetail> {
    if records_equal(old, new) {
        return None;
    }
    Some(ChangeDetail {
        changes: describe_changes(old, new),
        old: old.clone(),
        new: new.clone(),
    })
}

/// Compare two snapshots, leaving out paths that match `ignore_patterns`.
pub fn diff(
    baseline: Arc<Snapshot>,
    current: Arc<Snapshot>,
    ignore_patterns: &[String],
) -> DiffResult {
    let config = DiffConfig {
        ignore_patterns: ignore_patterns.to_vec(),
        ..DiffConfig::default()
    };
    Differ::new(config).compare(baseline, current)
}
