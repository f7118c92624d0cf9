//! In-memory [`ContentCache`] for tests.

use crate::error::{ErrorKind, Result};
use crate::{ContentCache, FileRecord, ProcessResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tome_extract::ContentKind;

/// Records kept in a map. Counts batch writes, and can be told to fail them.
#[derive(Debug, Default)]
pub struct MemoryCache {
    records: RwLock<HashMap<PathBuf, FileRecord>>,
    batches: AtomicUsize,
    failing: AtomicBool,
}
impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty [`batch_update()`](ContentCache::batch_update) calls so far.
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Make every following write fail with [`ErrorKind::Database`].
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Database);
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<FileRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }
}

#[async_trait]
impl ContentCache for MemoryCache {
    async fn get_record(&self, path: &Path) -> Result<Option<FileRecord>> {
        Ok(self.records.read().await.get(path).cloned())
    }

    async fn batch_update(&self, results: &[ProcessResult]) -> Result<()> {
        self.check_writable()?;
        if results.is_empty() {
            return Ok(());
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.write().await;
        for result in results {
            records
                .entry(result.path.clone())
                .or_insert_with(|| FileRecord::new(&result.path))
                .apply(&result.patch);
        }
        Ok(())
    }

    async fn update_mtimes(&self, kind: ContentKind, mtimes: &[(PathBuf, i64)]) -> Result<()> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        for (path, mtime) in mtimes {
            let record = records.entry(path.clone()).or_insert_with(|| FileRecord::new(path));
            record.stamps.set(kind, Some(*mtime));
            record.mtime = record.mtime.max(*mtime);
        }
        Ok(())
    }

    async fn clear_field(&self, kind: ContentKind) -> Result<()> {
        self.check_writable()?;
        for record in self.records.write().await.values_mut() {
            record.clear(kind);
        }
        Ok(())
    }

    async fn record_exists(&self, path: &Path) -> Result<bool> {
        Ok(self.records.read().await.contains_key(path))
    }

    async fn set_consumers(&self, provider: &Path, consumers: &[PathBuf]) -> Result<()> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        let record = records.entry(provider.to_path_buf()).or_insert_with(|| FileRecord::new(provider));
        record.feature_image_consumers = consumers.to_vec();
        Ok(())
    }

    async fn rename_record(&self, from: &Path, to: &Path) -> Result<()> {
        self.check_writable()?;
        if from == to {
            return Ok(());
        }
        let mut records = self.records.write().await;
        records.remove(to);
        if let Some(mut record) = records.remove(from) {
            record.path = to.to_path_buf();
            records.insert(to.to_path_buf(), record);
        }
        Ok(())
    }

    async fn delete_record(&self, path: &Path) -> Result<()> {
        self.check_writable()?;
        self.records.write().await.remove(path);
        Ok(())
    }

    async fn list_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<_> = self.records.read().await.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }
}
