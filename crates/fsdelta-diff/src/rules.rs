//! Criticality rules for security-relevant paths.

use std::path::Path;
use std::sync::LazyLock;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::result::ChangeKind;

/// Errors building a rule.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid glob '{pattern}' in rule '{rule}': {source}")]
    InvalidGlob {
        rule: String,
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Path predicate of a rule.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Path equals one of the values.
    Exact(Vec<String>),
    /// Path starts with one of the values.
    Prefix(Vec<String>),
    /// Path ends with one of the values.
    Suffix(Vec<String>),
    /// Path contains one of the values.
    Contains(Vec<String>),
    /// Full path or file name matches one of the globs.
    Glob { patterns: Vec<String>, set: GlobSet },
}

impl PathMatcher {
    pub fn exact<S: AsRef<str>>(values: &[S]) -> Self {
        Self::Exact(owned(values))
    }

    pub fn prefix<S: AsRef<str>>(values: &[S]) -> Self {
        Self::Prefix(owned(values))
    }

    pub fn suffix<S: AsRef<str>>(values: &[S]) -> Self {
        Self::Suffix(owned(values))
    }

    pub fn contains<S: AsRef<str>>(values: &[S]) -> Self {
        Self::Contains(owned(values))
    }

    /// Compile glob patterns. `*` does not cross `/`.
    pub fn glob<S: AsRef<str>>(rule: &str, patterns: &[S]) -> Result<Self, RuleError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| RuleError::InvalidGlob {
                    rule: rule.to_string(),
                    pattern: pattern.to_string(),
                    source,
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| RuleError::InvalidGlob {
            rule: rule.to_string(),
            pattern: String::new(),
            source,
        })?;
        Ok(Self::Glob {
            patterns: owned(patterns),
            set,
        })
    }

    /// Whether `path` satisfies this predicate.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(values) => values.iter().any(|v| path == v),
            Self::Prefix(values) => values.iter().any(|v| path.starts_with(v.as_str())),
            Self::Suffix(values) => values.iter().any(|v| path.ends_with(v.as_str())),
            Self::Contains(values) => values.iter().any(|v| path.contains(v.as_str())),
            Self::Glob { set, .. } => {
                set.is_match(path)
                    || Path::new(path)
                        .file_name()
                        .is_some_and(|name| set.is_match(Path::new(name)))
            }
        }
    }
}

fn owned<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values.iter().map(|v| v.as_ref().to_string()).collect()
}

/// Severity per change kind, 1 (low) to 10 (critical). `None` means the
/// rule does not score that kind of change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Severity {
    pub added: Option<u8>,
    pub modified: Option<u8>,
    pub deleted: Option<u8>,
}

impl Severity {
    pub const fn new(added: u8, modified: u8, deleted: u8) -> Self {
        Self {
            added: Some(added),
            modified: Some(modified),
            deleted: Some(deleted),
        }
    }

    pub fn get(&self, kind: ChangeKind) -> Option<u8> {
        match kind {
            ChangeKind::Added => self.added,
            ChangeKind::Modified => self.modified,
            ChangeKind::Deleted => self.deleted,
        }
    }
}

/// A named path predicate with per-kind severities.
#[derive(Debug, Clone)]
pub struct CriticalityRule {
    /// Evaluation order; lower runs first.
    pub order: u32,
    pub name: String,
    pub category: String,
    pub description: String,
    pub matcher: PathMatcher,
    pub severity: Severity,
}

impl CriticalityRule {
    pub fn new(
        order: u32,
        name: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
        matcher: PathMatcher,
        severity: Severity,
    ) -> Self {
        Self {
            order,
            name: name.into(),
            category: category.into(),
            description: description.into(),
            matcher,
            severity,
        }
    }
}

/// An ordered list of rules. The first rule whose matcher accepts a path
/// decides its score.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CriticalityRule>,
}

static BUILTIN: LazyLock<RuleSet> = LazyLock::new(|| RuleSet::new(builtin_rules()));

impl RuleSet {
    /// Build a rule set, ordering rules by their `order` key. Rules with
    /// equal keys keep their relative order.
    pub fn new(mut rules: Vec<CriticalityRule>) -> Self {
        rules.sort_by_key(|r| r.order);
        Self { rules }
    }

    /// The built-in rules for common Linux system paths.
    pub fn builtin() -> &'static RuleSet {
        &BUILTIN
    }

    pub fn rules(&self) -> &[CriticalityRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The first rule matching `path`.
    pub fn first_match(&self, path: &str) -> Option<&CriticalityRule> {
        self.rules.iter().find(|r| r.matcher.matches(path))
    }
}

fn builtin_rules() -> Vec<CriticalityRule> {
    use PathMatcher as M;

    let ssh_host_keys = match M::glob("ssh-host-keys", &["/etc/ssh/ssh_host_*"]) {
        Ok(matcher) => Some(CriticalityRule::new(
            70,
            "ssh-host-keys",
            "remote-access",
            "SSH host keys modified",
            matcher,
            Severity::new(9, 9, 8),
        )),
        Err(err) => {
            warn!(error = %err, "skipping built-in rule");
            None
        }
    };

    let mut rules = vec![
        CriticalityRule::new(
            10,
            "user-accounts",
            "authentication",
            "User account database modified",
            M::exact(&["/etc/passwd"]),
            Severity::new(10, 10, 10),
        ),
        CriticalityRule::new(
            20,
            "password-hashes",
            "authentication",
            "Password hash database modified",
            M::exact(&["/etc/shadow"]),
            Severity::new(10, 10, 9),
        ),
        CriticalityRule::new(
            30,
            "sudo-config",
            "authorization",
            "Sudo privileges configuration modified",
            M::exact(&["/etc/sudoers"]),
            Severity::new(10, 10, 9),
        ),
        CriticalityRule::new(
            40,
            "group-membership",
            "authentication",
            "Group membership database modified",
            M::exact(&["/etc/group"]),
            Severity::new(8, 8, 7),
        ),
        CriticalityRule::new(
            50,
            "system-binaries",
            "system-integrity",
            "Critical system binary modified",
            M::prefix(&["/bin/", "/sbin/", "/usr/bin/", "/usr/sbin/"]),
            Severity::new(8, 9, 7),
        ),
        CriticalityRule::new(
            60,
            "boot-binaries",
            "boot-security",
            "Boot-related binary modified",
            M::prefix(&["/boot/"]),
            Severity::new(9, 9, 8),
        ),
        CriticalityRule::new(
            80,
            "ssh-keys",
            "remote-access",
            "SSH keys or configuration modified",
            M::contains(&["/.ssh/", "/etc/ssh/"]),
            Severity::new(8, 8, 7),
        ),
        CriticalityRule::new(
            90,
            "systemd-services",
            "service-management",
            "Systemd service configuration modified",
            M::prefix(&["/etc/systemd/", "/lib/systemd/", "/usr/lib/systemd/"]),
            Severity::new(6, 7, 5),
        ),
        CriticalityRule::new(
            100,
            "init-scripts",
            "service-management",
            "System initialization script modified",
            M::prefix(&["/etc/init.d/"]),
            Severity::new(7, 7, 6),
        ),
        CriticalityRule::new(
            110,
            "crontab-files",
            "scheduled-tasks",
            "Crontab file modified",
            M::suffix(&["crontab"]),
            Severity::new(8, 8, 7),
        ),
        CriticalityRule::new(
            120,
            "cron-system",
            "scheduled-tasks",
            "System cron configuration modified",
            M::prefix(&["/etc/cron", "/var/spool/cron/"]),
            Severity::new(7, 7, 6),
        ),
        CriticalityRule::new(
            130,
            "root-profile",
            "privileged-access",
            "Root user profile modified",
            M::exact(&["/root/.bashrc", "/root/.profile", "/root/.bash_profile"]),
            Severity::new(9, 9, 8),
        ),
        CriticalityRule::new(
            140,
            "root-directory",
            "privileged-access",
            "Root user directory modified",
            M::prefix(&["/root/"]),
            Severity::new(8, 8, 7),
        ),
        CriticalityRule::new(
            150,
            "pam-config",
            "access-control",
            "PAM authentication configuration modified",
            M::prefix(&["/etc/pam.d/"]),
            Severity::new(7, 8, 6),
        ),
        CriticalityRule::new(
            160,
            "security-limits",
            "access-control",
            "Security limits configuration modified",
            M::prefix(&["/etc/security/"]),
            Severity::new(6, 7, 5),
        ),
        CriticalityRule::new(
            170,
            "hosts-file",
            "network-security",
            "System hosts file modified",
            M::exact(&["/etc/hosts"]),
            Severity::new(6, 6, 5),
        ),
        CriticalityRule::new(
            180,
            "dns-config",
            "network-security",
            "DNS configuration modified",
            M::exact(&["/etc/resolv.conf"]),
            Severity::new(5, 6, 5),
        ),
        CriticalityRule::new(
            190,
            "network-interfaces",
            "network-security",
            "Network interface configuration modified",
            M::prefix(&["/etc/network/"]),
            Severity::new(5, 6, 5),
        ),
        CriticalityRule::new(
            200,
            "apt-config",
            "package-security",
            "APT package manager configuration modified",
            M::prefix(&["/etc/apt/"]),
            Severity::new(4, 5, 4),
        ),
        CriticalityRule::new(
            210,
            "yum-config",
            "package-security",
            "YUM package manager configuration modified",
            M::prefix(&["/etc/yum/", "/etc/yum.conf"]),
            Severity::new(4, 5, 4),
        ),
        CriticalityRule::new(
            220,
            "kernel-modules",
            "kernel-security",
            "Kernel module configuration modified",
            M::prefix(&["/etc/modules", "/etc/modprobe"]),
            Severity::new(7, 8, 6),
        ),
        CriticalityRule::new(
            230,
            "sysctl-config",
            "kernel-security",
            "Kernel parameter configuration modified",
            M::contains(&["sysctl"]),
            Severity::new(6, 7, 5),
        ),
        CriticalityRule::new(
            240,
            "web-server-config",
            "application-security",
            "Web server configuration modified",
            M::prefix(&["/etc/apache2/", "/etc/nginx/", "/etc/httpd/"]),
            Severity::new(5, 6, 4),
        ),
        CriticalityRule::new(
            250,
            "database-config",
            "application-security",
            "Database configuration modified",
            M::prefix(&[
                "/etc/mysql/",
                "/etc/postgresql/",
                "/var/lib/mysql/",
                "/var/lib/postgresql/",
            ]),
            Severity::new(6, 7, 5),
        ),
    ];
    rules.extend(ssh_host_keys);
    rules
}
