//! Document store trait and implementations.
//!
//! This module defines the [`DocumentStore`] trait, the read-only view of a
//! vault that the indexing pipeline works against. The local filesystem
//! implementation is used by the CLI; the mock store backs unit tests in
//! this and the downstream crates.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalStore;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockStore;
use crate::error::Result;
use crate::file::{FileEvent, FileRef};
use crate::link::{link_target, resolve_among};
use crate::structure::DocumentStructure;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;

pub type FileRefStream<'a> = Pin<Box<dyn Stream<Item = Result<FileRef>> + Send + 'a>>;

/// Unified read-only interface over a vault.
///
/// # Path Handling
/// All paths are relative to the vault root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tome_storage::{DocumentStore, error::Result};
///
/// async fn tags_of(store: &dyn DocumentStore) -> Result<Vec<String>> {
///     let structure = store.structure(Path::new("Projects/Plan.md")).await?;
///     Ok(structure.tags)
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the store, used for logging only.
    fn name(&self) -> &str;

    /// Stream every file in the vault.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use tome_storage::{DocumentStore, error::Result};
    /// # async fn example(store: &dyn DocumentStore) -> Result<()> {
    /// let mut stream = store.list_stream();
    /// while let Some(file) = stream.try_next().await? {
    ///     println!("{}: {} bytes", file.path.display(), file.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream(&self) -> FileRefStream<'_>;

    /// Collect [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self) -> Result<Vec<FileRef>> {
        self.list_stream().try_collect().await
    }

    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Current metadata of a file. Returns
    /// [`NotFound`](crate::error::ErrorKind::NotFound) if the file does not
    /// exist.
    async fn stat(&self, path: &Path) -> Result<FileRef>;

    /// Read raw file contents.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Read a file as text, replacing invalid UTF-8 sequences.
    async fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path).await?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })
    }

    /// Frontmatter, inline tags, embeds and links of a document. Files that
    /// are not markdown documents have an empty structure.
    async fn structure(&self, path: &Path) -> Result<DocumentStructure> {
        if !crate::FileKind::from_path(path).is_document() {
            return Ok(DocumentStructure::default());
        }
        let text = self.read_to_string(path).await?;
        Ok(DocumentStructure::parse(&text))
    }

    /// Resolve a link or embed reference (`[[cover.png]]`, `img/a.png`, …)
    /// written inside `source` to the file it points at. External URLs and
    /// unresolvable references yield `None`.
    async fn resolve_link(&self, link: &str, source: &Path) -> Result<Option<FileRef>> {
        let Some(target) = link_target(link) else {
            return Ok(None);
        };
        let files = self.list().await?;
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        let found = resolve_among(&target, source, paths.iter().map(PathBuf::as_path));
        Ok(found.and_then(|path| files.into_iter().find(|f| f.path == path)))
    }

    /// Let the store know the vault changed, so any lookup index it keeps
    /// can be refreshed. The default does nothing.
    async fn notify(&self, _event: &FileEvent) {}
}
