//! Local filesystem document store.
//!
//! Walks a vault directory with `tokio::fs`. Dot-prefixed entries
//! (`.obsidian/`, `.git/`, `.trash/`) are not part of the vault and are
//! never listed.

use crate::backend::FileRefStream;
use crate::error::ErrorKind;
use crate::file::FileEvent;
use crate::link::{link_target, resolve_among};
use crate::{DocumentStore, FileRef, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs::{self, DirEntry};
use tokio::sync::RwLock;

enum WalkEntry {
    File(FileRef),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem document store.
///
/// All paths are relative to the vault root. Link resolution uses a cached
/// list of vault paths, rebuilt lazily after [`notify()`](DocumentStore::notify)
/// or whenever a lookup misses.
///
/// # Examples
///
/// ```no_run
/// use tome_storage::backend::LocalStore;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = LocalStore::new("vault", "/home/me/Notes")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LocalStore {
    name: String,
    root: PathBuf,
    paths: RwLock<Option<Vec<PathBuf>>>,
}
impl LocalStore {
    /// Open an existing vault directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, does not exist or is
    /// not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if !root.exists() {
            exn::bail!(ErrorKind::NotFound(root));
        }
        if !root.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root, paths: RwLock::new(None) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| ErrorKind::OutsideVault(absolute.to_path_buf()))?;
        Ok(validate_path(relative)?)
    }

    fn file_ref(path: &Path, metadata: &Metadata) -> Result<FileRef> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        let mtime = (OffsetDateTime::from(modified).unix_timestamp_nanos() / 1_000_000) as i64;
        Ok(FileRef::new(path, mtime, metadata.len()))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Keeps the `?` operator usable for a single directory entry; the
    /// stream loop itself can only yield.
    async fn process_entry(&self, entry: DirEntry) -> Result<WalkEntry> {
        if entry.file_name().to_string_lossy().starts_with('.') {
            return Ok(WalkEntry::Skip);
        }
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if metadata.is_file() {
            let relative = self.relative_path(&path)?;
            return Ok(WalkEntry::File(Self::file_ref(&relative, &metadata)?));
        }
        // Broken symlink, socket, etc.
        Ok(WalkEntry::Skip)
    }

    async fn candidates(&self, refresh: bool) -> Result<Vec<PathBuf>> {
        if !refresh && let Some(paths) = self.paths.read().await.as_ref() {
            return Ok(paths.clone());
        }
        let paths: Vec<PathBuf> = self.list().await?.into_iter().map(|f| f.path).collect();
        *self.paths.write().await = Some(paths.clone());
        Ok(paths)
    }

    async fn resolve_cached(&self, target: &str, source: &Path, refresh: bool) -> Result<Option<FileRef>> {
        let candidates = self.candidates(refresh).await?;
        let Some(found) = resolve_among(target, source, candidates.iter().map(PathBuf::as_path)) else {
            return Ok(None);
        };
        match self.stat(&found).await {
            Ok(file) => Ok(Some(file)),
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream(&self) -> FileRefStream<'_> {
        let mut stack = vec![self.root.clone()];
        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Directory removed between listing its parent and now.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn stat(&self, path: &Path) -> Result<FileRef> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        Self::file_ref(&validate_path(path)?, &metadata)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn resolve_link(&self, link: &str, source: &Path) -> Result<Option<FileRef>> {
        let Some(target) = link_target(link) else {
            return Ok(None);
        };
        if let Some(found) = self.resolve_cached(&target, source, false).await? {
            return Ok(Some(found));
        }
        self.resolve_cached(&target, source, true).await
    }

    async fn notify(&self, event: &FileEvent) {
        // Contents edits don't change the set of paths.
        if !matches!(event, FileEvent::Modified(_)) {
            *self.paths.write().await = None;
        }
    }
}
