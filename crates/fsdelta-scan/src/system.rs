//! Host description and process limits for scans.

use std::path::Path;

use sysinfo::System;
use tracing::debug;

use fsdelta_core::{SystemInfo, path_key};

/// Describe the current host for a scan rooted at `scan_root`.
pub fn collect_system_info(scan_root: &Path) -> SystemInfo {
    let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
    let mut info = SystemInfo::new(path_key(scan_root), hostname);

    info.distro = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "unknown".to_string());
    info.kernel_version = System::kernel_version().unwrap_or_else(|| "unknown".to_string());
    info
}

/// Raise the soft open-file limit to the hard limit.
///
/// Returns the new soft limit, or `None` if it could not be changed.
#[cfg(unix)]
pub fn raise_fd_limit() -> Option<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };

    // SAFETY: `limit` is a valid, writable rlimit.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
        debug!(error = %std::io::Error::last_os_error(), "getrlimit failed");
        return None;
    }

    if limit.rlim_cur >= limit.rlim_max {
        return Some(limit.rlim_cur as u64);
    }

    let previous = limit.rlim_cur;
    limit.rlim_cur = limit.rlim_max;

    // macOS rejects an unlimited soft limit for descriptors.
    #[cfg(target_os = "macos")]
    {
        limit.rlim_cur = limit.rlim_cur.min(10_240);
    }

    // SAFETY: `limit` is a valid rlimit and we never exceed the hard limit.
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) } != 0 {
        debug!(error = %std::io::Error::last_os_error(), "could not raise open file limit");
        return None;
    }

    debug!(from = previous as u64, to = limit.rlim_cur as u64, "raised open file limit");
    Some(limit.rlim_cur as u64)
}

#[cfg(not(unix))]
pub fn raise_fd_limit() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_system_info() {
        let info = collect_system_info(Path::new("/srv/data"));
        assert_eq!(info.scan_root, "/srv/data");
        assert!(!info.hostname.is_empty());
        assert!(!info.os.is_empty());
        assert!(info.cpu_count >= 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_raise_fd_limit_is_idempotent() {
        let first = raise_fd_limit();
        let second = raise_fd_limit();
        if let (Some(a), Some(b)) = (first, second) {
            assert!(b >= a);
        }
    }
}
