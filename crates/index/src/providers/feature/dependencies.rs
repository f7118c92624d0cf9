use super::{DependencyTracker, FeatureImageProvider};
use crate::error::{ErrorKind, Result};
use crate::scheduler::Scheduler;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tome_cache::FileRecord;
use tome_storage::StoreHandle;
use tome_storage::error::ErrorKind as StorageErrorKind;

/// Handed to whoever sees a file disappear, change or move, so that the
/// documents whose feature image depends on it get recomputed.
#[derive(Clone)]
pub struct FeatureImageDependencies {
    tracker: Arc<DependencyTracker>,
    scheduler: Scheduler<FeatureImageProvider>,
    store: StoreHandle,
}

impl FeatureImageDependencies {
    pub fn new(scheduler: Scheduler<FeatureImageProvider>, store: StoreHandle) -> Self {
        let tracker = scheduler.strategy().tracker().clone();
        Self { tracker, scheduler, store }
    }

    /// Force the feature image of every listed document to be recomputed.
    /// Documents that no longer exist are skipped.
    pub async fn enqueue_consumers(&self, consumers: &[PathBuf]) -> Result<()> {
        let mut files = Vec::with_capacity(consumers.len());
        for consumer in consumers {
            match self.store.stat(consumer).await {
                Ok(file) => files.push(file),
                Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => {
                    tracing::debug!(path = %consumer.display(), "consumer is gone");
                },
                Err(e) => return Err(e).or_raise(|| ErrorKind::Storage),
            }
        }
        if !files.is_empty() {
            tracing::debug!(consumers = files.len(), "re-resolving feature images");
            self.scheduler.queue_forced(files);
        }
        Ok(())
    }

    /// `provider` was deleted or renamed away.
    pub async fn mark_provider_deleted(&self, provider: &Path) -> Result<()> {
        let consumers = self.tracker.mark_provider_deleted(provider).await?;
        self.enqueue_consumers(&consumers).await
    }

    /// `provider` was modified.
    pub async fn provider_changed(&self, provider: &Path) -> Result<()> {
        let consumers = self.tracker.provider_changed(provider).await?;
        self.enqueue_consumers(&consumers).await
    }

    /// The document behind `record` was deleted: it stops using its provider.
    pub async fn consumer_deleted(&self, record: &FileRecord) -> Result<()> {
        match &record.feature_image_provider {
            Some(provider) if *provider != record.path => {
                let render = record.feature_image.as_deref().map(Path::new);
                self.tracker.detach(&record.path, provider, render).await
            },
            _ => Ok(()),
        }
    }

    /// The document behind `record` moved to `to`.
    pub async fn consumer_renamed(&self, record: &FileRecord, to: &Path) -> Result<()> {
        match &record.feature_image_provider {
            Some(provider) if *provider != record.path => self.tracker.rename_consumer(provider, &record.path, to).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerStatus;
    use tome_cache::{ContentCache, FeatureImagePatch, MemoryCache, ProcessResult};
    use tome_render::{MockRasterizer, RasterizerRegistry, RenderCache};
    use tome_storage::FileKind;
    use tome_storage::backend::MockStore;

    #[tokio::test]
    async fn test_deleted_provider_requeues_live_consumers() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MockStore::default());
        let cache = Arc::new(MemoryCache::new());
        let registry = RasterizerRegistry::new().with(FileKind::Pdf, Arc::new(MockRasterizer::new()));
        let tracker = Arc::new(DependencyTracker::new(cache.clone(), RenderCache::new(dir.path()), registry));
        let scheduler = Scheduler::new(FeatureImageProvider::new(store.clone(), tracker.clone()), cache.clone());
        let dependencies = FeatureImageDependencies::new(scheduler.clone(), store.clone());

        let pdf = store.write("Manual.pdf", "%PDF").await;
        let none = FeatureImagePatch::default();
        for consumer in ["A.md", "B.md"] {
            store.write(consumer, "![[Manual.pdf]]").await;
            let patch = tracker.acquire(Path::new(consumer), &pdf, FileKind::Pdf, &none, 64).await.unwrap();
            cache.batch_update(&[ProcessResult::new(consumer, patch.clone())]).await.unwrap();
            tracker.commit(Path::new(consumer), &none, &patch).await.unwrap();
        }
        // B is gone from the vault already.
        store.delete("B.md").await.unwrap();

        dependencies.mark_provider_deleted(Path::new("Manual.pdf")).await.unwrap();
        assert_eq!(scheduler.queue_len(), 1);
        assert_eq!(scheduler.status(), SchedulerStatus::Idle);

        // The consumer list is cleared, so a second notice requeues nothing.
        dependencies.mark_provider_deleted(Path::new("Manual.pdf")).await.unwrap();
        assert_eq!(scheduler.queue_len(), 1);
    }
}
