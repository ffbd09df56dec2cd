//! Severity scoring of diff entries.

use serde::Serialize;

use fsdelta_core::FileRecord;

use crate::result::{ChangeKind, DiffResult};
use crate::rules::RuleSet;

/// Categories treated as security-relevant by [`Classifier::security_changes`].
pub const SECURITY_CATEGORIES: &[&str] = &[
    "authentication",
    "authorization",
    "remote-access",
    "privileged-access",
    "access-control",
    "network-security",
];

/// A diff entry scored by the first rule matching its path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalChange<'a> {
    pub path: &'a str,
    pub kind: ChangeKind,
    pub severity: u8,
    pub rule: &'a str,
    pub category: &'a str,
    pub description: &'a str,
    /// The new record for additions and modifications, the old one for
    /// deletions.
    pub record: &'a FileRecord,
}

/// Applies a [`RuleSet`] to diff results.
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'r> {
    rules: &'r RuleSet,
}

impl Classifier<'static> {
    /// A classifier over the built-in rules.
    pub fn builtin() -> Self {
        Self {
            rules: RuleSet::builtin(),
        }
    }
}

impl Default for Classifier<'static> {
    fn default() -> Self {
        Self::builtin()
    }
}

impl<'r> Classifier<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &'r RuleSet {
        self.rules
    }

    /// Score every change in `result`, highest severity first.
    ///
    /// Each path is scored by the first matching rule only. A path with no
    /// matching rule, or whose rule has no severity for its change kind, is
    /// left out. Equal severities are ordered by path.
    pub fn classify<'a>(&self, result: &'a DiffResult) -> Vec<CriticalChange<'a>>
    where
        'r: 'a,
    {
        let rules = self.rules;
        let mut critical: Vec<_> = result
            .iter()
            .filter_map(|(path, kind, record)| {
                let rule = rules.first_match(path)?;
                let severity = rule.severity.get(kind)?;
                Some(CriticalChange {
                    path,
                    kind,
                    severity,
                    rule: &rule.name,
                    category: &rule.category,
                    description: &rule.description,
                    record,
                })
            })
            .collect();

        critical.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.path.cmp(b.path)));
        critical
    }

    /// Scored changes in one category.
    pub fn by_category<'a>(&self, result: &'a DiffResult, category: &str) -> Vec<CriticalChange<'a>>
    where
        'r: 'a,
    {
        self.classify(result)
            .into_iter()
            .filter(|c| c.category == category)
            .collect()
    }

    /// Scored changes with severity of at least `min`.
    pub fn by_min_severity<'a>(&self, result: &'a DiffResult, min: u8) -> Vec<CriticalChange<'a>>
    where
        'r: 'a,
    {
        self.classify(result)
            .into_iter()
            .filter(|c| c.severity >= min)
            .collect()
    }

    /// Scored changes in [`SECURITY_CATEGORIES`].
    pub fn security_changes<'a>(&self, result: &'a DiffResult) -> Vec<CriticalChange<'a>>
    where
        'r: 'a,
    {
        self.classify(result)
            .into_iter()
            .filter(|c| SECURITY_CATEGORIES.contains(&c.category))
            .collect()
    }
}

/// Score `result` against the built-in rules.
pub fn classify_critical_changes(result: &DiffResult) -> Vec<CriticalChange<'_>> {
    Classifier::builtin().classify(result)
}
