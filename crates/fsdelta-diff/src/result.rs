//! Comparison results.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use fsdelta_core::{FileRecord, Snapshot};

/// How a path changed between two snapshots.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A path present in both snapshots whose records differ.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeDetail {
    pub old: FileRecord,
    pub new: FileRecord,
    /// Human-readable change tags, most significant first.
    pub changes: Vec<String>,
}

/// Aggregate figures for a comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub added_count: usize,
    pub modified_count: usize,
    pub deleted_count: usize,
    pub total_changes: usize,
    /// Bytes in added records.
    pub added_size: u64,
    /// Bytes in deleted records.
    pub deleted_size: u64,
    /// `added_size - deleted_size`.
    pub size_diff: i64,
    /// Sum of `new.size - old.size` over modified records.
    pub modified_size_delta: i64,
    pub comparison_time: Duration,
}

impl Summary {
    fn compute(
        added: &BTreeMap<String, FileRecord>,
        modified: &BTreeMap<String, ChangeDetail>,
        deleted: &BTreeMap<String, FileRecord>,
        comparison_time: Duration,
    ) -> Self {
        let added_size: u64 = added.values().map(|r| r.size).sum();
        let deleted_size: u64 = deleted.values().map(|r| r.size).sum();
        let modified_size_delta = modified
            .values()
            .map(|d| d.new.size as i64 - d.old.size as i64)
            .sum();

        Self {
            added_count: added.len(),
            modified_count: modified.len(),
            deleted_count: deleted.len(),
            total_changes: added.len() + modified.len() + deleted.len(),
            added_size,
            deleted_size,
            size_diff: added_size as i64 - deleted_size as i64,
            modified_size_delta,
            comparison_time,
        }
    }
}

/// The outcome of comparing a baseline snapshot with a current one.
///
/// `added`, `modified` and `deleted` are disjoint and keyed by path.
#[derive(Debug, Clone, Serialize)]
pub struct DiffResult {
    pub added: BTreeMap<String, FileRecord>,
    pub modified: BTreeMap<String, ChangeDetail>,
    pub deleted: BTreeMap<String, FileRecord>,
    pub summary: Summary,
    pub generated: DateTime<Utc>,
    #[serde(skip)]
    pub baseline: Arc<Snapshot>,
    #[serde(skip)]
    pub current: Arc<Snapshot>,
}

impl DiffResult {
    pub(crate) fn new(
        baseline: Arc<Snapshot>,
        current: Arc<Snapshot>,
        added: BTreeMap<String, FileRecord>,
        modified: BTreeMap<String, ChangeDetail>,
        deleted: BTreeMap<String, FileRecord>,
        comparison_time: Duration,
    ) -> Self {
        let summary = Summary::compute(&added, &modified, &deleted, comparison_time);
        Self {
            added,
            modified,
            deleted,
            summary,
            generated: Utc::now(),
            baseline,
            current,
        }
    }

    /// True when the snapshots were found identical.
    pub fn is_empty(&self) -> bool {
        self.summary.total_changes == 0
    }

    /// Changed paths grouped by kind, each list sorted.
    pub fn changes_by_kind(&self) -> BTreeMap<ChangeKind, Vec<&str>> {
        let mut grouped = BTreeMap::new();
        grouped.insert(
            ChangeKind::Added,
            self.added.keys().map(String::as_str).collect(),
        );
        grouped.insert(
            ChangeKind::Modified,
            self.modified.keys().map(String::as_str).collect(),
        );
        grouped.insert(
            ChangeKind::Deleted,
            self.deleted.keys().map(String::as_str).collect(),
        );
        grouped
    }

    /// The record that represents a change: the new record for additions
    /// and modifications, the old one for deletions.
    pub fn record(&self, path: &str, kind: ChangeKind) -> Option<&FileRecord> {
        match kind {
            ChangeKind::Added => self.added.get(path),
            ChangeKind::Modified => self.modified.get(path).map(|d| &d.new),
            ChangeKind::Deleted => self.deleted.get(path),
        }
    }

    /// Every change in kind order (added, modified, deleted), paths sorted
    /// within each kind.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ChangeKind, &FileRecord)> {
        let added = self
            .added
            .iter()
            .map(|(p, r)| (p.as_str(), ChangeKind::Added, r));
        let modified = self
            .modified
            .iter()
            .map(|(p, d)| (p.as_str(), ChangeKind::Modified, &d.new));
        let deleted = self
            .deleted
            .iter()
            .map(|(p, r)| (p.as_str(), ChangeKind::Deleted, r));
        added.chain(modified).chain(deleted)
    }

    /// Keep only the changes for which `keep(path, kind)` holds.
    ///
    /// The summary is recomputed for the retained entries; the comparison
    /// time and snapshot references carry over.
    pub fn filter<F>(&self, mut keep: F) -> DiffResult
    where
        F: FnMut(&str, ChangeKind) -> bool,
    {
        let added: BTreeMap<_, _> = self
            .added
            .iter()
            .filter(|(p, _)| keep(p, ChangeKind::Added))
            .map(|(p, r)| (p.clone(), r.clone()))
            .collect();
        let modified: BTreeMap<_, _> = self
            .modified
            .iter()
            .filter(|(p, _)| keep(p, ChangeKind::Modified))
            .map(|(p, d)| (p.clone(), d.clone()))
            .collect();
        let deleted: BTreeMap<_, _> = self
            .deleted
            .iter()
            .filter(|(p, _)| keep(p, ChangeKind::Deleted))
            .map(|(p, r)| (p.clone(), r.clone()))
            .collect();

        let summary = Summary::compute(&added, &modified, &deleted, self.summary.comparison_time);
        DiffResult {
            added,
            modified,
            deleted,
            summary,
            generated: self.generated,
            baseline: Arc::clone(&self.baseline),
            current: Arc::clone(&self.current),
        }
    }
}
