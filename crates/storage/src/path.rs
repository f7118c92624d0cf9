//! Vault path validation.
//!
//! Every path handed to a [`DocumentStore`](crate::DocumentStore) is relative
//! to the vault root. Validation normalizes the path and refuses anything that
//! would escape the root.

use exn::OptionExt;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Normalize a vault-relative path, resolving `.` and `..` lexically.
///
/// Fails with [`InvalidPath`](ErrorKind::InvalidPath) when the path is empty,
/// carries a Windows prefix or a null byte, or would climb above the vault
/// root. A leading `/` is read as the vault root. Symlinks are not followed.
///
/// ```
/// use std::path::Path;
/// use tome_storage::validate_path;
/// assert_eq!(validate_path("/Inbox.md").unwrap(), Path::new("Inbox.md"));
/// assert_eq!(validate_path("Daily/../Projects/./roadmap.md").unwrap(), Path::new("Projects/roadmap.md"));
/// assert!(validate_path("Projects/../../secrets.md").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(path.to_path_buf());
    let mut normalized: Vec<&OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir | Component::RootDir => {},
            // Would truncate the path at the syscall boundary.
            Component::Normal(name) if name.as_encoded_bytes().contains(&0) => exn::bail!(invalid()),
            Component::Normal(name) => normalized.push(name),
            Component::ParentDir => {
                normalized.pop().ok_or_raise(invalid)?;
            },
            Component::Prefix(_) => exn::bail!(invalid()),
        }
    }
    if normalized.is_empty() {
        exn::bail!(invalid());
    }
    Ok(normalized.into_iter().collect())
}

/// Folder names leading to a file, root first. The file name itself is not
/// included.
///
/// ```
/// use tome_storage::path_segments;
/// assert_eq!(path_segments("Work/2024/plan.md"), vec!["Work", "2024"]);
/// assert!(path_segments("plan.md").is_empty());
/// ```
pub fn segments(path: impl AsRef<Path>) -> Vec<String> {
    let path = path.as_ref();
    path.parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate(Path::new("Projects/roadmap.md")).unwrap(), Path::new("Projects/roadmap.md"));
        assert_eq!(validate(Path::new("a/b/c/cover.png")).unwrap(), Path::new("a/b/c/cover.png"));
        assert_eq!(validate(Path::new("/Inbox.md")).unwrap(), Path::new("Inbox.md"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate(Path::new("../etc/passwd")).is_err());
        assert!(validate(Path::new("a/../../b")).is_err());
        assert!(validate(Path::new("..")).is_err());
    }

    #[test]
    fn test_empty_and_null() {
        assert!(validate(Path::new("")).is_err());
        assert!(validate(Path::new("./")).is_err());
        assert!(validate(Path::new("a\0b")).is_err());
    }

    #[test]
    fn test_segments() {
        assert_eq!(segments("a/b/c.md"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(segments("c.md"), Vec::<String>::new());
    }
}
