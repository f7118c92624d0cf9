//! Persistent cache of content derived from vault files.
//!
//! The cache is not the source of truth: the vault is. Every field stored
//! here can be thrown away and recomputed from the files themselves, which is
//! exactly what a rebuild does.
//!
//! # Layout
//! One [`FileRecord`] per vault path. Each derived field (tags, preview,
//! metadata, feature image) is owned by exactly one content kind and carries
//! its own stamp: the file mtime at which the field was last written. A
//! kind's stamp is only ever touched through
//! [`update_mtimes()`](ContentCache::update_mtimes) with that kind, so a slow
//! kind can never mark another kind's work as done.

mod db;
pub mod error;
#[cfg(any(test, feature = "mock"))]
mod memory;
mod models;
mod repo;

pub use crate::db::Database;
#[cfg(any(test, feature = "mock"))]
pub use crate::memory::MemoryCache;
pub use crate::models::{FeatureImagePatch, FieldPatch, FileRecord, ProcessResult, Stamps};
pub use crate::repo::Repository;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tome_extract::ContentKind;

pub type CacheHandle = Arc<dyn ContentCache + Send + Sync>;

/// Storage for derived content, keyed by vault path.
#[async_trait]
pub trait ContentCache {
    async fn get_record(&self, path: &Path) -> Result<Option<FileRecord>>;

    /// Write a batch of field patches atomically. Creates records as needed;
    /// fields not named by a patch are left alone, stamps included.
    async fn batch_update(&self, results: &[ProcessResult]) -> Result<()>;

    /// Set `kind`'s stamp for each path. The record mtime becomes the
    /// largest stamp it has seen.
    async fn update_mtimes(&self, kind: ContentKind, mtimes: &[(PathBuf, i64)]) -> Result<()>;

    /// Clear `kind`'s field and stamp on every record, so the next indexing
    /// pass recomputes it from scratch.
    async fn clear_field(&self, kind: ContentKind) -> Result<()>;

    async fn record_exists(&self, path: &Path) -> Result<bool>;

    /// Replace the list of files using `provider`'s image as their feature
    /// image.
    async fn set_consumers(&self, provider: &Path, consumers: &[PathBuf]) -> Result<()>;

    /// Move a record to a new path, replacing whatever was there.
    async fn rename_record(&self, from: &Path, to: &Path) -> Result<()>;

    async fn delete_record(&self, path: &Path) -> Result<()>;

    async fn list_paths(&self) -> Result<Vec<PathBuf>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tome_extract::{FileMetadata, TagSet};

    /// Every test runs against both implementations.
    async fn backends() -> Vec<CacheHandle> {
        let db = Database::connect_in_memory().await.unwrap();
        vec![Arc::new(Repository::from(&db)), Arc::new(MemoryCache::new())]
    }

    fn tags(list: &[&str]) -> TagSet {
        TagSet { tags: list.iter().map(|t| t.to_string()).collect(), ..Default::default() }
    }

    fn path(p: &str) -> PathBuf {
        PathBuf::from(p)
    }

    #[tokio::test]
    async fn test_patches_touch_only_their_field() {
        for cache in backends().await {
            cache
                .batch_update(&[
                    ProcessResult::new("a.md", tags(&["one"])),
                    ProcessResult::new("a.md", "Preview".to_string()),
                ])
                .await
                .unwrap();
            cache.update_mtimes(ContentKind::Tags, &[(path("a.md"), 10)]).await.unwrap();
            let metadata = FileMetadata { name: Some("A".to_string()), ..Default::default() };
            cache.batch_update(&[ProcessResult::new("a.md", metadata.clone())]).await.unwrap();

            let record = cache.get_record(Path::new("a.md")).await.unwrap().unwrap();
            assert_eq!(record.tags, Some(tags(&["one"])));
            assert_eq!(record.preview.as_deref(), Some("Preview"));
            assert_eq!(record.metadata, Some(metadata));
            assert_eq!(record.stamp(ContentKind::Tags), Some(10));
            assert_eq!(record.stamp(ContentKind::Preview), None);
            assert_eq!(record.mtime, 10);
        }
    }

    #[tokio::test]
    async fn test_mtime_is_largest_stamp() {
        for cache in backends().await {
            cache.update_mtimes(ContentKind::Preview, &[(path("a.md"), 30)]).await.unwrap();
            cache.update_mtimes(ContentKind::Tags, &[(path("a.md"), 20)]).await.unwrap();
            let record = cache.get_record(Path::new("a.md")).await.unwrap().unwrap();
            assert_eq!(record.mtime, 30);
            assert_eq!(record.stamp(ContentKind::Tags), Some(20));
            assert_eq!(record.stamp(ContentKind::Preview), Some(30));
        }
    }

    #[tokio::test]
    async fn test_feature_image_patch_and_consumers() {
        for cache in backends().await {
            let patch = FeatureImagePatch {
                image: Some("Assets/cover.png".to_string()),
                resized: Some("data:image/png;base64,AAAA".to_string()),
                provider: Some(path("Assets/cover.png")),
            };
            cache.batch_update(&[ProcessResult::new("a.md", patch.clone())]).await.unwrap();
            cache.set_consumers(Path::new("Assets/cover.png"), &[path("a.md")]).await.unwrap();
            let record = cache.get_record(Path::new("a.md")).await.unwrap().unwrap();
            assert_eq!(record.feature_image_patch(), patch);
            let provider = cache.get_record(Path::new("Assets/cover.png")).await.unwrap().unwrap();
            assert_eq!(provider.feature_image_consumers, vec![path("a.md")]);
            // An empty patch clears all three fields at once.
            cache.batch_update(&[ProcessResult::new("a.md", FeatureImagePatch::default())]).await.unwrap();
            let record = cache.get_record(Path::new("a.md")).await.unwrap().unwrap();
            assert!(record.feature_image_patch().is_empty());
        }
    }

    #[tokio::test]
    async fn test_clear_field() {
        for cache in backends().await {
            cache
                .batch_update(&[
                    ProcessResult::new("a.md", tags(&["one"])),
                    ProcessResult::new("b.md", tags(&["two"])),
                    ProcessResult::new("b.md", "kept".to_string()),
                ])
                .await
                .unwrap();
            cache.update_mtimes(ContentKind::Tags, &[(path("a.md"), 1), (path("b.md"), 2)]).await.unwrap();
            cache.clear_field(ContentKind::Tags).await.unwrap();
            for p in ["a.md", "b.md"] {
                let record = cache.get_record(Path::new(p)).await.unwrap().unwrap();
                assert_eq!(record.tags, None);
                assert_eq!(record.stamp(ContentKind::Tags), None);
            }
            let b = cache.get_record(Path::new("b.md")).await.unwrap().unwrap();
            assert_eq!(b.preview.as_deref(), Some("kept"));
        }
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        for cache in backends().await {
            cache
                .batch_update(&[
                    ProcessResult::new("old.md", "moved".to_string()),
                    ProcessResult::new("new.md", "replaced".to_string()),
                ])
                .await
                .unwrap();
            cache.rename_record(Path::new("old.md"), Path::new("new.md")).await.unwrap();
            assert!(!cache.record_exists(Path::new("old.md")).await.unwrap());
            let record = cache.get_record(Path::new("new.md")).await.unwrap().unwrap();
            assert_eq!(record.preview.as_deref(), Some("moved"));
            assert_eq!(record.path, path("new.md"));
            // Renaming something never indexed is not an error.
            cache.rename_record(Path::new("ghost.md"), Path::new("other.md")).await.unwrap();

            cache.delete_record(Path::new("new.md")).await.unwrap();
            assert!(cache.list_paths().await.unwrap().is_empty());
            assert_eq!(cache.get_record(Path::new("new.md")).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_list_paths_sorted() {
        for cache in backends().await {
            let mtimes = vec![(path("b.md"), 1), (path("a.md"), 1), (path("c/d.md"), 1)];
            cache.update_mtimes(ContentKind::Metadata, &mtimes).await.unwrap();
            assert_eq!(cache.list_paths().await.unwrap(), vec![path("a.md"), path("b.md"), path("c/d.md")]);
        }
    }
}
