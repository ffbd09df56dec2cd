//! Platform metadata providers.
//!
//! Ownership, permission bits, extended attributes and security labels are
//! OS-specific. The walker only talks to [`MetadataProvider`]; each platform
//! supplies one implementation.

use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;

use fsdelta_core::PlatformMetadata;

/// Extended attribute holding the SELinux security context.
pub const SELINUX_XATTR: &str = "security.selinux";

/// Looks up platform metadata for a path.
pub trait MetadataProvider: Send + Sync {
    /// Metadata for `path`, given its already-fetched `lstat` result.
    fn collect(&self, path: &Path, metadata: &Metadata) -> Option<PlatformMetadata>;
}

/// Provider that never reports anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetadataProvider;

impl MetadataProvider for NoopMetadataProvider {
    fn collect(&self, _path: &Path, _metadata: &Metadata) -> Option<PlatformMetadata> {
        None
    }
}

/// The best provider for the current platform.
pub fn default_provider() -> Arc<dyn MetadataProvider> {
    #[cfg(unix)]
    {
        Arc::new(unix::UnixMetadataProvider::default())
    }
    #[cfg(not(unix))]
    {
        Arc::new(NoopMetadataProvider)
    }
}

#[cfg(unix)]
pub use unix::UnixMetadataProvider;

#[cfg(unix)]
mod unix {
    use std::collections::BTreeMap;
    use std::fs::Metadata;
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;

    use fsdelta_core::{ExtendedMetadata, PlatformMetadata};

    use super::{MetadataProvider, SELINUX_XATTR};

    /// Owner, group and permission bits from `lstat`, plus extended
    /// attributes on Linux.
    #[derive(Debug, Clone, Copy)]
    pub struct UnixMetadataProvider {
        read_xattrs: bool,
    }

    impl UnixMetadataProvider {
        /// Create a provider, optionally skipping extended attributes.
        pub fn new(read_xattrs: bool) -> Self {
            Self { read_xattrs }
        }
    }

    impl Default for UnixMetadataProvider {
        fn default() -> Self {
            Self::new(true)
        }
    }

    impl MetadataProvider for UnixMetadataProvider {
        fn collect(&self, path: &Path, metadata: &Metadata) -> Option<PlatformMetadata> {
            let extended = if self.read_xattrs {
                read_extended(path)
            } else {
                None
            };

            Some(PlatformMetadata {
                owner_id: metadata.uid(),
                group_id: metadata.gid(),
                permissions: metadata.mode() & 0o7777,
                extended,
            })
        }
    }

    fn read_extended(path: &Path) -> Option<ExtendedMetadata> {
        let mut xattrs = super::xattr::list(path)?;

        let security_label = xattrs.remove(SELINUX_XATTR).map(|label| {
            let mut map = BTreeMap::new();
            map.insert("label".to_string(), label);
            map
        });

        let extended = ExtendedMetadata {
            security_label,
            xattrs: (!xattrs.is_empty()).then_some(xattrs),
        };
        (!extended.is_empty()).then_some(extended)
    }
}

#[cfg(target_os = "linux")]
mod xattr {
    use std::collections::BTreeMap;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    /// All extended attributes of `path` (not following symlinks).
    pub(super) fn list(path: &Path) -> Option<BTreeMap<String, String>> {
        let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;

        // SAFETY: a null buffer with size 0 asks only for the required length.
        let len = unsafe { libc::llistxattr(c_path.as_ptr(), std::ptr::null_mut(), 0) };
        if len <= 0 {
            return None;
        }

        let mut names = vec![0u8; len as usize];
        // SAFETY: `names` is writable for `names.len()` bytes.
        let len = unsafe {
            libc::llistxattr(c_path.as_ptr(), names.as_mut_ptr().cast(), names.len())
        };
        if len <= 0 {
            return None;
        }
        names.truncate(len as usize);

        let mut attrs = BTreeMap::new();
        for name in names.split(|b| *b == 0).filter(|n| !n.is_empty()) {
            let Ok(c_name) = CString::new(name) else {
                continue;
            };
            if let Some(value) = get(&c_path, &c_name) {
                attrs.insert(String::from_utf8_lossy(name).into_owned(), render(&value));
            }
        }

        (!attrs.is_empty()).then_some(attrs)
    }

    fn get(path: &CString, name: &CString) -> Option<Vec<u8>> {
        // SAFETY: size query with a null buffer.
        let size =
            unsafe { libc::lgetxattr(path.as_ptr(), name.as_ptr(), std::ptr::null_mut(), 0) };
        if size < 0 {
            return None;
        }
        if size == 0 {
            return Some(Vec::new());
        }

        let mut value = vec![0u8; size as usize];
        // SAFETY: `value` is writable for `value.len()` bytes.
        let size = unsafe {
            libc::lgetxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_mut_ptr().cast(),
                value.len(),
            )
        };
        if size < 0 {
            return None;
        }
        value.truncate(size as usize);
        Some(value)
    }

    /// Text values keep their text (minus a trailing NUL), binary values become hex.
    fn render(value: &[u8]) -> String {
        let trimmed = value.strip_suffix(&[0]).unwrap_or(value);
        match std::str::from_utf8(trimmed) {
            Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
            _ => value.iter().map(|b| format!("{b:02x}")).collect(),
        }
    }

}

#[cfg(all(unix, not(target_os = "linux")))]
mod xattr {
    use std::collections::BTreeMap;
    use std::path::Path;

    pub(super) fn list(_path: &Path) -> Option<BTreeMap<String, String>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_noop_provider() {
        let temp = TempDir::new().unwrap();
        let meta = std::fs::symlink_metadata(temp.path()).unwrap();
        assert!(NoopMetadataProvider.collect(temp.path(), &meta).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_provider_reports_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let meta = std::fs::symlink_metadata(&path).unwrap();
        let platform = UnixMetadataProvider::new(false)
            .collect(&path, &meta)
            .unwrap();
        assert_eq!(platform.permissions, 0o640);
        assert!(platform.extended.is_none());
    }
}
