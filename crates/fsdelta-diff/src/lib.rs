//! Snapshot comparison for fsdelta.
//!
//! This crate turns two snapshots into a report of what changed:
//!
//! - **Diff engine** - classify every path as added, modified or deleted,
//!   with readable change tags for modifications
//! - **Criticality scoring** - rank changes to security-relevant paths
//!   using an ordered rule table
//!
//! # Comparing snapshots
//!
//! Paths present in only one snapshot are added or deleted. Paths present
//! in both are modified when their records differ: content hash, size,
//! mode and ownership for files; mode, modification time and ownership for
//! directories. If both snapshots carry the same root digest the
//! comparison is skipped entirely.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fsdelta_diff::diff;
//! use fsdelta_store::load_snapshot;
//!
//! let baseline = Arc::new(load_snapshot("baseline.snap")?);
//! let current = Arc::new(load_snapshot("current.snap")?);
//!
//! let result = diff(baseline, current, &["/var/log/".to_string()]);
//! for (path, detail) in &result.modified {
//!     println!("{path}: {}", detail.changes.join(", "));
//! }
//! ```
//!
//! # Scoring changes
//!
//! ```rust,ignore
//! use fsdelta_diff::Classifier;
//!
//! let classifier = Classifier::builtin();
//! for change in classifier.by_min_severity(&result, 8) {
//!     println!("[{}] {} {} ({})", change.severity, change.kind, change.path, change.rule);
//! }
//! ```

mod changes;
mod critical;
mod engine;
mod export;
pub mod ignore;
mod result;
pub mod rules;

pub use changes::{describe_changes, records_equal};
pub use critical::{CriticalChange, Classifier, SECURITY_CATEGORIES, classify_critical_changes};
pub use engine::{Differ, diff};
pub use export::{EXPORT_HEADER, ExportRow};
pub use ignore::DiffPathFilter;
pub use result::{ChangeDetail, ChangeKind, DiffResult, Summary};
pub use rules::{CriticalityRule, PathMatcher, RuleError, RuleSet, Severity};

// Re-export core types
pub use fsdelta_core::{DiffConfig, DiffConfigBuilder, FileRecord, Snapshot};
