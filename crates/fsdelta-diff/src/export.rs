//! Flat rows for spreadsheet-style reports.

use serde::Serialize;

use fsdelta_core::FileRecord;

use crate::result::{ChangeKind, DiffResult};

/// Column names, in row order.
pub const EXPORT_HEADER: [&str; 7] = ["Path", "Type", "Size", "Mode", "ModTime", "Hash", "Changes"];

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One changed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub path: String,
    pub kind: ChangeKind,
    pub size: u64,
    pub mode: String,
    pub modified: String,
    pub hash: String,
    /// Change tags joined with `"; "`; empty for additions and deletions.
    pub changes: String,
}

impl ExportRow {
    fn new(path: &str, kind: ChangeKind, record: &FileRecord, changes: String) -> Self {
        Self {
            path: path.to_string(),
            kind,
            size: record.size,
            mode: record.mode_string(),
            modified: record.modified.format(TIME_FORMAT).to_string(),
            hash: record.hash.clone(),
            changes,
        }
    }

    /// The row as strings, matching [`EXPORT_HEADER`].
    pub fn fields(&self) -> [String; 7] {
        [
            self.path.clone(),
            self.kind.to_string(),
            self.size.to_string(),
            self.mode.clone(),
            self.modified.clone(),
            self.hash.clone(),
            self.changes.clone(),
        ]
    }
}

impl DiffResult {
    /// One row per change: additions, then modifications (described by the
    /// new record), then deletions.
    pub fn export_rows(&self) -> Vec<ExportRow> {
        self.iter()
            .map(|(path, kind, record)| {
                let changes = match kind {
                    ChangeKind::Modified => self
                        .modified
                        .get(path)
                        .map(|d| d.changes.join("; "))
                        .unwrap_or_default(),
                    _ => String::new(),
                };
                ExportRow::new(path, kind, record, changes)
            })
            .collect()
    }
}
