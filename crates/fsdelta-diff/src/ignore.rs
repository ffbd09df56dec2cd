//! Diff-time path exclusion.
//!
//! Independent of the scan-time [`fsdelta_core::PathFilter`]: a pattern
//! here hides entries from a comparison without changing what was
//! recorded.

use std::path::{MAIN_SEPARATOR, Path};

use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

#[derive(Debug, Clone)]
struct Pattern {
    text: String,
    glob: Option<GlobMatcher>,
}

/// Matches paths against diff ignore patterns.
///
/// A path is ignored when, for any pattern, one of these holds (checked in
/// order): exact equality, a path component equal to the pattern, a glob
/// match (patterns containing `*`) on the file name or the full path, or a
/// prefix, suffix or substring match.
#[derive(Debug, Clone, Default)]
pub struct DiffPathFilter {
    patterns: Vec<Pattern>,
}

impl DiffPathFilter {
    /// Build a filter. Empty patterns are skipped; invalid globs keep their
    /// plain-text checks.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .map(AsRef::as_ref)
            .filter(|p| !p.is_empty())
            .map(|text| {
                let glob = if text.contains('*') {
                    match GlobBuilder::new(text).literal_separator(true).build() {
                        Ok(glob) => Some(glob.compile_matcher()),
                        Err(err) => {
                            warn!(pattern = text, error = %err, "invalid diff ignore glob");
                            None
                        }
                    }
                } else {
                    None
                };
                Pattern {
                    text: text.to_string(),
                    glob,
                }
            })
            .collect();
        Self { patterns }
    }

    /// True when no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `path` is excluded from the comparison.
    pub fn should_ignore(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

impl Pattern {
    fn matches(&self, path: &str) -> bool {
        let pattern = self.text.as_str();
        if path == pattern {
            return true;
        }
        if path.split(MAIN_SEPARATOR).any(|part| part == pattern) {
            return true;
        }
        if let Some(glob) = &self.glob {
            let name = Path::new(path).file_name().map(Path::new);
            if name.is_some_and(|n| glob.is_match(n)) || glob.is_match(path) {
                return true;
            }
        }
        path.starts_with(pattern) || path.ends_with(pattern) || path.contains(pattern)
    }
}
