//! Scan-time path filtering.
//!
//! Patterns are classified once, at construction:
//!
//! | pattern shape           | match                                   |
//! |-------------------------|-----------------------------------------|
//! | `*/suffix`              | path ends with `/suffix`                |
//! | `prefix/*`              | path starts with `prefix/`              |
//! | other, containing `*`   | glob against base name or full path     |
//! | starting with `/`       | path starts with pattern                |
//! | anything else           | path contains pattern                   |
//!
//! A prefix ending in `/` also matches the directory it names.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::warn;

/// Volatile, virtual, cache and version-control locations skipped by default.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "/proc/",
    "/sys/",
    "/dev/",
    "/run/",
    "/var/run/",
    "/var/lock/",
    "/var/cache/",
    "/var/tmp/",
    "*/.git",
    "*/.svn",
    "*/.hg",
    "*/.cache",
    "*/__pycache__",
    "*/node_modules",
    "*.tmp",
    "*.swp",
    "*.swo",
    "*~",
];

/// Decides whether a path is excluded from a scan.
#[derive(Debug, Clone)]
pub struct PathFilter {
    prefixes: Vec<String>,
    suffixes: Vec<String>,
    substrings: Vec<String>,
    globs: GlobSet,
    patterns: Vec<String>,
}

impl PathFilter {
    /// Built-in defaults plus the given patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self::build(true, patterns)
    }

    /// Only the given patterns.
    pub fn without_defaults<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self::build(false, patterns)
    }

    /// Build a filter, optionally including [`DEFAULT_IGNORE_PATTERNS`].
    pub fn build<S: AsRef<str>>(use_defaults: bool, patterns: &[S]) -> Self {
        let defaults = if use_defaults {
            DEFAULT_IGNORE_PATTERNS
        } else {
            &[]
        };

        let mut filter = Self {
            prefixes: Vec::new(),
            suffixes: Vec::new(),
            substrings: Vec::new(),
            globs: GlobSet::empty(),
            patterns: Vec::new(),
        };
        let mut globs = GlobSetBuilder::new();

        let all = defaults
            .iter()
            .copied()
            .chain(patterns.iter().map(AsRef::as_ref));

        for pattern in all {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            filter.patterns.push(pattern.to_string());

            if let Some(suffix) = pattern.strip_prefix('*').filter(|s| s.starts_with('/') && !s.contains('*')) {
                filter.suffixes.push(suffix.to_string());
            } else if let Some(prefix) = pattern.strip_suffix('*').filter(|p| p.ends_with('/') && !p.contains('*')) {
                filter.prefixes.push(prefix.to_string());
            } else if pattern.contains('*') {
                match GlobBuilder::new(pattern).literal_separator(true).build() {
                    Ok(glob) => {
                        globs.add(glob);
                    }
                    Err(err) => warn!(pattern, error = %err, "skipping invalid ignore pattern"),
                }
            } else if pattern.starts_with('/') {
                filter.prefixes.push(pattern.to_string());
            } else {
                filter.substrings.push(pattern.to_string());
            }
        }

        filter.globs = match globs.build() {
            Ok(set) => set,
            Err(err) => {
                warn!(error = %err, "failed to compile ignore globs");
                GlobSet::empty()
            }
        };
        filter
    }

    /// Check if a path should be skipped. Pure, no I/O.
    pub fn should_ignore(&self, path: &str) -> bool {
        if self.prefixes.iter().any(|p| prefix_matches(path, p)) {
            return true;
        }
        if self.suffixes.iter().any(|s| path.ends_with(s.as_str())) {
            return true;
        }
        if self.substrings.iter().any(|s| path.contains(s.as_str())) {
            return true;
        }
        if !self.globs.is_empty() {
            if let Some(name) = Path::new(path).file_name() {
                if self.globs.is_match(name) {
                    return true;
                }
            }
            if self.globs.is_match(path) {
                return true;
            }
        }
        false
    }

    /// All active patterns, defaults first.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new::<&str>(&[])
    }
}

fn prefix_matches(path: &str, prefix: &str) -> bool {
    if path.starts_with(prefix) {
        return true;
    }
    prefix.len() > 1 && prefix.ends_with('/') && path == &prefix[..prefix.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patterns() {
        let filter = PathFilter::default();
        assert!(filter.should_ignore("/proc"));
        assert!(filter.should_ignore("/proc/1/status"));
        assert!(!filter.should_ignore("/process/data"));
        assert!(filter.should_ignore("/home/u/project/.git"));
        assert!(filter.should_ignore("/home/u/project/node_modules"));
        assert!(filter.should_ignore("/home/u/notes.txt~"));
        assert!(filter.should_ignore("/home/u/.main.rs.swp"));
        assert!(!filter.should_ignore("/home/u/project/src/main.rs"));
        assert!(!filter.should_ignore("/home/u/.gitignore"));
    }

    #[test]
    fn test_substring_pattern() {
        let filter = PathFilter::without_defaults(&["cache"]);
        assert!(filter.should_ignore("/var/lib/cache/x"));
        assert!(filter.should_ignore("/home/u/.cachefile"));
        assert!(!filter.should_ignore("/home/u/data"));
    }

    #[test]
    fn test_prefix_patterns() {
        let filter = PathFilter::without_defaults(&["/mnt", "/srv/*"]);
        assert!(filter.should_ignore("/mnt/disk"));
        assert!(filter.should_ignore("/mnt"));
        assert!(filter.should_ignore("/srv/www/index.html"));
        assert!(filter.should_ignore("/srv"));
        assert!(!filter.should_ignore("/home/mnt"));
    }

    #[test]
    fn test_suffix_pattern() {
        let filter = PathFilter::without_defaults(&["*/build"]);
        assert!(filter.should_ignore("/home/u/project/build"));
        assert!(!filter.should_ignore("/home/u/project/build.rs"));
    }

    #[test]
    fn test_glob_pattern_base_and_full_path() {
        let filter = PathFilter::without_defaults(&["*.log", "/var/log/*.gz"]);
        assert!(filter.should_ignore("/var/app/server.log"));
        assert!(filter.should_ignore("/var/log/syslog.1.gz"));
        assert!(!filter.should_ignore("/var/log/nested/syslog.1.gz"));
        assert!(!filter.should_ignore("/var/app/server.txt"));
    }

    #[test]
    fn test_empty_patterns_are_skipped() {
        let filter = PathFilter::without_defaults(&["", "  "]);
        assert!(filter.patterns().is_empty());
        assert!(!filter.should_ignore("/anything"));
    }
}
