//! On-disk store of generated renders.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use rslug::slugify;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tome_storage::FileRef;

/// Directory of PNG renders, one per attachment identity.
///
/// Render names are derived from the attachment's base name, a short digest
/// of its vault path and its byte size. Equally named attachments in
/// different folders never share a render, and an edited attachment maps to
/// a new render while the old one is left for the caller to delete.
#[derive(Debug, Clone)]
pub struct RenderCache {
    dir: PathBuf,
}
impl RenderCache {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, attachment: &FileRef) -> PathBuf {
        let slug = slugify!(&attachment.basename());
        let slug = if slug.is_empty() { "render".to_string() } else { slug };
        let digest = blake3::hash(attachment.path.to_string_lossy().as_bytes()).to_hex();
        self.dir.join(format!("{slug}-{}-{}.png", &digest.as_str()[..8], attachment.size))
    }

    /// Whether `path` names a file inside this cache.
    pub fn contains(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
    }

    pub async fn exists(&self, path: &Path) -> bool {
        self.contains(path) && tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path).await.or_raise(|| ErrorKind::Io)
    }

    pub async fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if !self.contains(path) {
            exn::bail!(ErrorKind::Unsupported(path.to_path_buf()));
        }
        tokio::fs::create_dir_all(&self.dir).await.or_raise(|| ErrorKind::Io)?;
        tokio::fs::write(path, bytes).await.or_raise(|| ErrorKind::Io)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "render written");
        Ok(())
    }

    /// Delete a render. Returns `false` when there was nothing to delete;
    /// paths outside the cache are never touched.
    pub async fn remove(&self, path: &Path) -> Result<bool> {
        if !self.contains(path) {
            return Ok(false);
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "render deleted");
                Ok(true)
            },
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).or_raise(|| ErrorKind::Io),
        }
    }

    /// Delete every render. Returns how many files were removed.
    pub async fn purge(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Io),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Io)? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "png") && self.remove(&path).await? {
                removed += 1;
            }
        }
        tracing::info!(dir = %self.dir.display(), removed, "render cache purged");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(path: &str, size: u64) -> FileRef {
        FileRef::new(path, 0, size)
    }

    #[test]
    fn test_path_is_deterministic() {
        let cache = RenderCache::new("/renders");
        let a = cache.path_for(&attachment("Docs/Report Q1.pdf", 2048));
        assert_eq!(a, cache.path_for(&attachment("Docs/Report Q1.pdf", 2048)));
        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("report"));
        assert!(name.ends_with("-2048.png"));
        assert!(!name.contains(' '));
        assert!(cache.contains(&a));
        // A changed attachment gets a different render.
        assert_ne!(a, cache.path_for(&attachment("Docs/Report Q1.pdf", 4096)));
    }

    #[test]
    fn test_same_name_in_other_folder() {
        let cache = RenderCache::new("/renders");
        let a = cache.path_for(&attachment("Work/Manual.pdf", 2048));
        let b = cache.path_for(&attachment("Home/Manual.pdf", 2048));
        assert_ne!(a, b);
        for path in [&a, &b] {
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(name.starts_with("manual-"), "{name}");
            assert!(name.ends_with("-2048.png"), "{name}");
        }
    }

    #[test]
    fn test_contains() {
        let cache = RenderCache::new("/renders");
        assert!(!cache.contains(Path::new("/elsewhere/a.png")));
        assert!(!cache.contains(Path::new("/renders/nested/a.png")));
        assert!(!cache.contains(Path::new("Assets/cover.png")));
    }

    #[tokio::test]
    async fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RenderCache::new(dir.path().join("renders"));
        let path = cache.path_for(&attachment("flow.excalidraw.md", 10));
        assert!(!cache.exists(&path).await);
        cache.write(&path, b"png").await.unwrap();
        assert!(cache.exists(&path).await);
        assert_eq!(cache.read(&path).await.unwrap(), b"png");
        assert!(cache.remove(&path).await.unwrap());
        assert!(!cache.remove(&path).await.unwrap());
        assert!(!cache.exists(&path).await);
    }

    #[tokio::test]
    async fn test_purge() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RenderCache::new(dir.path().join("renders"));
        assert_eq!(cache.purge().await.unwrap(), 0);
        for size in [1, 2] {
            cache.write(&cache.path_for(&attachment("a.pdf", size)), b"png").await.unwrap();
        }
        std::fs::write(dir.path().join("renders/notes.txt"), b"keep").unwrap();
        assert_eq!(cache.purge().await.unwrap(), 2);
        assert!(dir.path().join("renders/notes.txt").exists());
    }

    #[tokio::test]
    async fn test_refuses_outside_paths() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("keep.png");
        std::fs::write(&outside, b"x").unwrap();
        let cache = RenderCache::new(dir.path().join("renders"));
        assert!(!cache.remove(&outside).await.unwrap());
        assert!(outside.exists());
        assert!(cache.write(&outside, b"y").await.is_err());
    }
}
