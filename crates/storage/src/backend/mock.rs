//! In-memory document store for testing.

use super::FileRefStream;
use crate::DocumentStore;
use crate::error::{ErrorKind, Result};
use crate::file::FileRef;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

const EPOCH: i64 = 1_700_000_000_000;

/// In-memory document store for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Modification
/// times come from a logical clock that advances by one millisecond on every
/// write, so consecutive edits are always distinguishable.
///
/// # Examples
///
/// ```
/// use tome_storage::DocumentStore;
/// use tome_storage::backend::MockStore;
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MockStore::with_files([("Inbox.md", "#idea")]);
/// assert!(store.exists(Path::new("Inbox.md")).await?);
///
/// let edited = store.write("Inbox.md", "#idea #later").await;
/// assert_eq!(store.stat(Path::new("Inbox.md")).await?, edited);
/// # Ok(())
/// # }
/// ```
pub struct MockStore {
    name: String,
    files: RwLock<HashMap<PathBuf, (i64, Vec<u8>)>>,
    clock: AtomicI64,
    reads: AtomicUsize,
}

impl MockStore {
    /// Create a mock store pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockStore::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (EPOCH, data.into()));
        }
        Self {
            name: "mock".to_string(),
            files: RwLock::new(map),
            clock: AtomicI64::new(EPOCH),
            reads: AtomicUsize::new(0),
        }
    }

    fn tick(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of [`read()`](DocumentStore::read) calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Create or overwrite a file, bumping its modification time.
    ///
    /// Panics on an invalid path.
    pub async fn write(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) -> FileRef {
        let path = path.into();
        let Ok(path) = validate_path(&path) else {
            panic!("MockStore::write: invalid path {}", path.display());
        };
        let data = data.into();
        let mtime = self.tick();
        let file = FileRef::new(&path, mtime, data.len() as u64);
        self.files.write().await.insert(path, (mtime, data));
        file
    }

    /// Bump a file's modification time without changing its contents.
    pub async fn touch(&self, path: impl AsRef<Path>) -> Result<FileRef> {
        let path = validate_path(path)?;
        let mtime = self.tick();
        let mut guard = self.files.write().await;
        let entry = guard.get_mut(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        entry.0 = mtime;
        Ok(FileRef::new(path, mtime, entry.1.len() as u64))
    }

    pub async fn delete(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = validate_path(path)?;
        self.files.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    /// Move a file. Like a filesystem rename, the modification time is kept.
    pub async fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<FileRef> {
        let from = validate_path(from)?;
        let to = validate_path(to)?;
        let mut guard = self.files.write().await;
        let entry = guard.remove(&from).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(from)))?;
        let file = FileRef::new(&to, entry.0, entry.1.len() as u64);
        guard.insert(to, entry);
        Ok(file)
    }
}
impl Default for MockStore {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl DocumentStore for MockStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream(&self) -> FileRefStream<'_> {
        Box::pin(stream! {
            // Snapshot under the read lock, then drop it before yielding.
            let mut entries: Vec<FileRef> = {
                let guard = self.files.read().await;
                guard.iter().map(|(path, (mtime, data))| FileRef::new(path, *mtime, data.len() as u64)).collect()
            };
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            for file in entries {
                yield Ok(file);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.files.read().await.contains_key(&path))
    }

    async fn stat(&self, path: &Path) -> Result<FileRef> {
        let path = validate_path(path)?;
        let guard = self.files.read().await;
        let (mtime, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileRef::new(&path, *mtime, data.len() as u64))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let (_, data) =
            self.files.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }
}
