//! The four schedulers behind one front door.

use crate::error::{ErrorKind, Result};
use crate::providers::{
    DependencyTracker, FeatureImageDependencies, FeatureImageProvider, MetadataProvider, PreviewProvider, TagProvider,
};
use crate::scheduler::Scheduler;
use crate::strategy::{ContentStrategy, Regeneration};
use exn::ResultExt;
use std::sync::{Arc, Mutex};
use tome_cache::CacheHandle;
use tome_config::Settings;
use tome_extract::ContentKind;
use tome_render::{RasterizerRegistry, RenderCache};
use tome_storage::{FileEvent, FileRef, StoreHandle};
use tracing::instrument;

/// Run `$body` once for each scheduler, bound to `$scheduler`.
macro_rules! each_scheduler {
    ($pipeline:expr, |$scheduler:ident| $body:expr) => {{
        {
            let $scheduler = &$pipeline.tags;
            $body;
        }
        {
            let $scheduler = &$pipeline.preview;
            $body;
        }
        {
            let $scheduler = &$pipeline.metadata;
            $body;
        }
        {
            let $scheduler = &$pipeline.feature;
            $body;
        }
    }};
}

/// Turns vault events and settings changes into scheduler work, record
/// moves and dependency bookkeeping.
pub struct ContentPipeline {
    store: StoreHandle,
    cache: CacheHandle,
    renders: RenderCache,
    settings: Mutex<Arc<Settings>>,
    tags: Scheduler<TagProvider>,
    preview: Scheduler<PreviewProvider>,
    metadata: Scheduler<MetadataProvider>,
    feature: Scheduler<FeatureImageProvider>,
    dependencies: FeatureImageDependencies,
}

impl ContentPipeline {
    pub fn new(
        store: StoreHandle,
        cache: CacheHandle,
        renders: RenderCache,
        rasterizers: RasterizerRegistry,
        settings: Settings,
    ) -> Self {
        let tracker = Arc::new(DependencyTracker::new(cache.clone(), renders.clone(), rasterizers));
        let feature = Scheduler::new(FeatureImageProvider::new(store.clone(), tracker), cache.clone());
        Self {
            tags: Scheduler::new(TagProvider::new(store.clone()), cache.clone()),
            preview: Scheduler::new(PreviewProvider::new(store.clone()), cache.clone()),
            metadata: Scheduler::new(MetadataProvider::new(store.clone()), cache.clone()),
            dependencies: FeatureImageDependencies::new(feature.clone(), store.clone()),
            feature,
            settings: Mutex::new(Arc::new(settings)),
            store,
            cache,
            renders,
        }
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn dependencies(&self) -> &FeatureImageDependencies {
        &self.dependencies
    }

    fn start(&self) {
        let settings = self.settings();
        each_scheduler!(self, |scheduler| scheduler.start_processing(settings.clone()));
    }

    /// Queue every file of the vault and start processing. Files whose
    /// cached content is current are skipped cheaply by the schedulers.
    #[instrument(skip(self))]
    pub async fn index_all(&self) -> Result<usize> {
        let files = self.store.list().await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!(store = self.store.name(), files = files.len(), "indexing vault");
        let count = files.len();
        each_scheduler!(self, |scheduler| scheduler.queue_files(files.iter().cloned()));
        self.start();
        Ok(count)
    }

    /// Apply one change notification from the host.
    #[instrument(skip(self))]
    pub async fn handle_event(&self, event: FileEvent) -> Result<()> {
        self.store.notify(&event).await;
        match event {
            FileEvent::Created(file) => {
                each_scheduler!(self, |scheduler| scheduler.queue_files([file.clone()]));
            },
            FileEvent::Modified(file) => {
                each_scheduler!(self, |scheduler| scheduler.queue_files([file.clone()]));
                self.dependencies.provider_changed(&file.path).await?;
            },
            FileEvent::Deleted(path) => {
                // Waits out any commit in progress, so nothing rewrites the
                // record after it is deleted below.
                each_scheduler!(self, |scheduler| scheduler.forget(&path).await);
                if let Some(record) = self.cache.get_record(&path).await.or_raise(|| ErrorKind::Cache)? {
                    self.dependencies.consumer_deleted(&record).await?;
                }
                self.dependencies.mark_provider_deleted(&path).await?;
                self.cache.delete_record(&path).await.or_raise(|| ErrorKind::Cache)?;
            },
            FileEvent::Renamed { from, to } => {
                each_scheduler!(self, |scheduler| scheduler.forget(&from).await);
                let record = self.cache.get_record(&from).await.or_raise(|| ErrorKind::Cache)?;
                self.dependencies.mark_provider_deleted(&from).await?;
                self.cache.rename_record(&from, &to.path).await.or_raise(|| ErrorKind::Cache)?;
                if let Some(record) = record {
                    self.dependencies.consumer_renamed(&record, &to.path).await?;
                }
                // Link resolution and path rules depend on where the file is.
                each_scheduler!(self, |scheduler| scheduler.queue_forced([to.clone()]));
            },
        }
        self.start();
        Ok(())
    }

    /// Swap in new settings. Kinds that were switched off lose their cached
    /// field; kinds that were switched on or reconfigured are recomputed for
    /// every file.
    #[instrument(skip_all)]
    pub async fn settings_changed(&self, settings: Settings) -> Result<()> {
        settings.validate().or_raise(|| ErrorKind::Settings)?;
        let new = Arc::new(settings);
        let old = {
            let mut current = self.settings.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *current, new.clone())
        };
        let mut files: Option<Vec<FileRef>> = None;
        each_scheduler!(self, |scheduler| {
            scheduler.on_settings_changed(new.clone());
            let regeneration = scheduler.strategy().should_regenerate(&old, &new);
            self.regenerate(scheduler, regeneration, &mut files, &new).await?
        });
        Ok(())
    }

    async fn regenerate<S: ContentStrategy>(
        &self,
        scheduler: &Scheduler<S>,
        regeneration: Regeneration,
        files: &mut Option<Vec<FileRef>>,
        settings: &Arc<Settings>,
    ) -> Result<()> {
        if regeneration == Regeneration::None {
            return Ok(());
        }
        tracing::info!(kind = %S::KIND, ?regeneration, "settings changed");
        self.clear_kind(scheduler).await?;
        if regeneration == Regeneration::Reprocess {
            if files.is_none() {
                *files = Some(self.store.list().await.or_raise(|| ErrorKind::Storage)?);
            }
            scheduler.queue_files(files.iter().flatten().cloned());
            scheduler.start_processing(settings.clone());
        }
        Ok(())
    }

    async fn clear_kind<S: ContentStrategy>(&self, scheduler: &Scheduler<S>) -> Result<()> {
        scheduler.clear_content().await.or_raise(|| ErrorKind::Cache)?;
        if S::KIND == ContentKind::FeatureImage {
            // Every provider link is gone, so every render is an orphan.
            self.renders.purge().await.or_raise(|| ErrorKind::Render)?;
        }
        Ok(())
    }

    /// Clear one kind's cached field everywhere.
    pub async fn clear(&self, kind: ContentKind) -> Result<()> {
        match kind {
            ContentKind::Tags => self.clear_kind(&self.tags).await,
            ContentKind::Preview => self.clear_kind(&self.preview).await,
            ContentKind::Metadata => self.clear_kind(&self.metadata).await,
            ContentKind::FeatureImage => self.clear_kind(&self.feature).await,
        }
    }

    /// Clear every field, then index the whole vault again.
    #[instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<usize> {
        for kind in ContentKind::ALL {
            self.clear(kind).await?;
        }
        self.index_all().await
    }

    /// Resolves once every scheduler has nothing left to do.
    pub async fn wait_idle(&self) {
        tokio::join!(self.tags.wait_idle(), self.preview.wait_idle(), self.metadata.wait_idle(), self.feature.wait_idle());
    }

    /// Stop all processing and drop queued work. Nothing from a batch
    /// interrupted here is written.
    pub fn stop(&self) {
        each_scheduler!(self, |scheduler| scheduler.stop_processing());
    }

    /// Total number of queued jobs across all kinds.
    pub fn queue_len(&self) -> usize {
        let mut total = 0;
        each_scheduler!(self, |scheduler| total += scheduler.queue_len());
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tome_cache::{ContentCache, FileRecord, MemoryCache};
    use tome_render::MockRasterizer;
    use tome_storage::FileKind;
    use tome_storage::backend::MockStore;

    struct Fixture {
        pipeline: ContentPipeline,
        store: Arc<MockStore>,
        cache: Arc<MemoryCache>,
        rasterizer: Arc<MockRasterizer>,
        dir: tempfile::TempDir,
    }

    fn settings() -> Settings {
        Settings { debounce_ms: 5, ..Default::default() }
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        fixture_with(files, MockRasterizer::new())
    }

    fn fixture_with(files: &[(&str, &str)], rasterizer: MockRasterizer) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MockStore::with_files(files.iter().copied()));
        let cache = Arc::new(MemoryCache::new());
        let rasterizer = Arc::new(rasterizer);
        let registry = RasterizerRegistry::new().with(FileKind::Pdf, rasterizer.clone());
        let renders = RenderCache::new(dir.path().join("renders"));
        let pipeline = ContentPipeline::new(store.clone(), cache.clone(), renders, registry, settings());
        Fixture { pipeline, store, cache, rasterizer, dir }
    }

    impl Fixture {
        async fn record(&self, path: &str) -> FileRecord {
            self.cache.get_record(Path::new(path)).await.unwrap().unwrap()
        }

        fn render_files(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("renders")).map(|entries| entries.count()).unwrap_or(0)
        }

        async fn index(&self) {
            self.pipeline.index_all().await.unwrap();
            self.pipeline.wait_idle().await;
        }

        async fn event(&self, event: FileEvent) {
            self.pipeline.handle_event(event).await.unwrap();
            self.pipeline.wait_idle().await;
        }
    }

    const PDF: &str = "%PDF-1.7";

    #[tokio::test]
    async fn test_full_pass() {
        let f = fixture(&[
            ("Inbox.md", "---\ntitle: Inbox\n---\n#ToDo call back, then #todo again\n"),
            ("img/cover.png", "png"),
        ]);
        f.index().await;
        let record = f.record("Inbox.md").await;
        assert_eq!(record.tags.as_ref().unwrap().tags, vec!["ToDo"]);
        assert_eq!(record.preview.as_deref(), Some("#ToDo call back, then #todo again"));
        assert_eq!(record.metadata.as_ref().unwrap().name.as_deref(), Some("Inbox"));
        assert_eq!(record.feature_image, None);
        assert!(record.stamp(ContentKind::FeatureImage).is_some());
        // Attachments get no derived content.
        assert!(!f.cache.record_exists(Path::new("img/cover.png")).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let f = fixture(&[("A.md", "#a ![[Manual.pdf]]"), ("B.md", "# B"), ("Manual.pdf", PDF)]);
        f.index().await;
        let before = f.cache.snapshot().await;
        let batches = f.cache.batches();
        f.index().await;
        assert_eq!(f.cache.batches(), batches);
        assert_eq!(f.cache.snapshot().await, before);
        assert_eq!(f.rasterizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_render_shared_between_documents() {
        let f = fixture(&[("A.md", "![[Manual.pdf]]"), ("B.md", "![[Manual.pdf]]"), ("Manual.pdf", PDF)]);
        f.index().await;
        assert_eq!(f.rasterizer.calls(), 1);
        assert_eq!(f.render_files(), 1);
        let (a, b) = (f.record("A.md").await, f.record("B.md").await);
        assert_eq!(a.feature_image, b.feature_image);
        assert_eq!(a.feature_image_provider.as_deref(), Some(Path::new("Manual.pdf")));
        let mut consumers = f.record("Manual.pdf").await.feature_image_consumers;
        consumers.sort();
        assert_eq!(consumers, vec![PathBuf::from("A.md"), PathBuf::from("B.md")]);
    }

    #[tokio::test]
    async fn test_provider_deleted() {
        let f = fixture(&[("A.md", "![[Manual.pdf]]"), ("B.md", "![[Manual.pdf]]"), ("Manual.pdf", PDF)]);
        f.index().await;
        f.store.delete("Manual.pdf").await.unwrap();
        f.event(FileEvent::Deleted(PathBuf::from("Manual.pdf"))).await;

        assert_eq!(f.render_files(), 0);
        assert!(!f.cache.record_exists(Path::new("Manual.pdf")).await.unwrap());
        for consumer in ["A.md", "B.md"] {
            let record = f.record(consumer).await;
            assert_eq!(record.feature_image, None);
            assert_eq!(record.feature_image_provider, None);
        }
    }

    #[tokio::test]
    async fn test_provider_modified() {
        let f = fixture(&[("A.md", "![[Manual.pdf]]"), ("Manual.pdf", PDF)]);
        f.index().await;
        let before = f.record("A.md").await.feature_image;
        let pdf = f.store.write("Manual.pdf", "%PDF-1.7 with another page").await;
        f.event(FileEvent::Modified(pdf)).await;
        assert_eq!(f.rasterizer.calls(), 2);
        assert_eq!(f.render_files(), 1);
        let after = f.record("A.md").await.feature_image;
        assert!(after.is_some());
        assert_ne!(after, before);
    }

    #[tokio::test]
    async fn test_consumer_lifecycle() {
        let f = fixture(&[("A.md", "![[Manual.pdf]]"), ("B.md", "![[Manual.pdf]]"), ("Manual.pdf", PDF)]);
        f.index().await;

        let moved = f.store.rename("A.md", "Archive/A.md").await.unwrap();
        f.event(FileEvent::Renamed { from: PathBuf::from("A.md"), to: moved }).await;
        assert!(!f.cache.record_exists(Path::new("A.md")).await.unwrap());
        let moved = f.record("Archive/A.md").await;
        assert_eq!(moved.feature_image_provider.as_deref(), Some(Path::new("Manual.pdf")));
        let mut consumers = f.record("Manual.pdf").await.feature_image_consumers;
        consumers.sort();
        assert_eq!(consumers, vec![PathBuf::from("Archive/A.md"), PathBuf::from("B.md")]);
        assert_eq!(f.rasterizer.calls(), 1);

        f.store.delete("B.md").await.unwrap();
        f.event(FileEvent::Deleted(PathBuf::from("B.md"))).await;
        assert_eq!(f.record("Manual.pdf").await.feature_image_consumers, vec![PathBuf::from("Archive/A.md")]);
        assert_eq!(f.render_files(), 1);

        // The last consumer dropping the embed orphans the render.
        let edited = f.store.write("Archive/A.md", "nothing embedded").await;
        f.event(FileEvent::Modified(edited)).await;
        assert_eq!(f.render_files(), 0);
        assert!(!f.cache.record_exists(Path::new("Manual.pdf")).await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_during_render_leaves_no_consumer() {
        let slow = MockRasterizer::with_delay(Duration::from_millis(200));
        let f = fixture_with(&[("A.md", "![[Manual.pdf]]"), ("Manual.pdf", PDF)], slow);
        f.pipeline.index_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        f.pipeline.stop();
        // Let the interrupted render run to completion.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(f.rasterizer.calls(), 1);
        assert!(!f.cache.record_exists(Path::new("Manual.pdf")).await.unwrap());
        assert_eq!(f.render_files(), 0);

        // The next pass starts from a consistent graph.
        f.index().await;
        assert_eq!(f.record("Manual.pdf").await.feature_image_consumers, vec![PathBuf::from("A.md")]);
        assert_eq!(f.render_files(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_during_render_leaves_no_consumer() {
        let slow = MockRasterizer::with_delay(Duration::from_millis(100));
        let f = fixture_with(&[("A.md", "![[Manual.pdf]]"), ("Manual.pdf", PDF)], slow);
        f.pipeline.index_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        f.cache.fail_writes(true);
        f.pipeline.wait_idle().await;
        f.cache.fail_writes(false);
        assert_eq!(f.record("A.md").await.feature_image, None);
        assert!(!f.cache.record_exists(Path::new("Manual.pdf")).await.unwrap());
        assert_eq!(f.render_files(), 0);
    }

    #[tokio::test]
    async fn test_delete_during_render_is_final() {
        let slow = MockRasterizer::with_delay(Duration::from_millis(200));
        let f = fixture_with(&[("A.md", "![[Manual.pdf]]"), ("Manual.pdf", PDF)], slow);
        f.pipeline.index_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(f.cache.record_exists(Path::new("A.md")).await.unwrap());
        f.store.delete("A.md").await.unwrap();
        f.event(FileEvent::Deleted(PathBuf::from("A.md"))).await;
        assert_eq!(f.rasterizer.calls(), 1);
        assert!(!f.cache.record_exists(Path::new("A.md")).await.unwrap());
        assert!(!f.cache.record_exists(Path::new("Manual.pdf")).await.unwrap());
        assert_eq!(f.render_files(), 0);
    }

    #[tokio::test]
    async fn test_touched_file_is_stamped_not_rewritten() {
        let f = fixture(&[("A.md", "#a ![[Manual.pdf]]"), ("Manual.pdf", PDF)]);
        f.index().await;
        let batches = f.cache.batches();
        let touched = f.store.touch("A.md").await.unwrap();
        f.event(FileEvent::Modified(touched.clone())).await;
        assert_eq!(f.cache.batches(), batches);
        let record = f.record("A.md").await;
        for kind in ContentKind::ALL {
            assert_eq!(record.stamp(kind), Some(touched.mtime), "{kind}");
        }
        assert_eq!(f.rasterizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_provider_renamed() {
        let f = fixture(&[("A.md", "![[Manual.pdf]]"), ("Manual.pdf", PDF)]);
        f.index().await;
        let moved = f.store.rename("Manual.pdf", "docs/Guide.pdf").await.unwrap();
        f.event(FileEvent::Renamed { from: PathBuf::from("Manual.pdf"), to: moved }).await;
        // The embed no longer resolves.
        let record = f.record("A.md").await;
        assert_eq!(record.feature_image, None);
        assert_eq!(f.render_files(), 0);
    }

    #[tokio::test]
    async fn test_settings_toggle_clears_and_repopulates() {
        let f = fixture(&[("A.md", "#one"), ("B.md", "#two")]);
        f.index().await;

        let mut disabled = settings();
        disabled.tags.enabled = false;
        f.pipeline.settings_changed(disabled.clone()).await.unwrap();
        f.pipeline.wait_idle().await;
        for path in ["A.md", "B.md"] {
            let record = f.record(path).await;
            assert_eq!(record.tags, None);
            assert!(record.preview.is_some());
        }

        f.pipeline.settings_changed(settings()).await.unwrap();
        f.pipeline.wait_idle().await;
        assert_eq!(f.record("A.md").await.tags.unwrap().tags, vec!["one"]);
        assert_eq!(f.record("B.md").await.tags.unwrap().tags, vec!["two"]);

        // Unrelated settings leave the fields alone.
        let batches = f.cache.batches();
        let mut tweaked = settings();
        tweaked.debounce_ms = 1;
        f.pipeline.settings_changed(tweaked).await.unwrap();
        f.pipeline.wait_idle().await;
        assert_eq!(f.cache.batches(), batches);
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let f = fixture(&[]);
        let mut broken = settings();
        broken.feature_image.thumbnail_size = 0;
        let err = f.pipeline.settings_changed(broken).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Settings));
        assert_eq!(f.pipeline.settings().feature_image.thumbnail_size, settings().feature_image.thumbnail_size);
    }

    #[tokio::test]
    async fn test_rebuild_and_clear() {
        let f = fixture(&[("A.md", "#one ![[Manual.pdf]]"), ("Manual.pdf", PDF)]);
        f.index().await;
        f.pipeline.clear(ContentKind::FeatureImage).await.unwrap();
        assert_eq!(f.render_files(), 0);
        assert_eq!(f.record("A.md").await.feature_image, None);
        assert!(f.record("A.md").await.tags.is_some());

        f.pipeline.rebuild().await.unwrap();
        f.pipeline.wait_idle().await;
        let record = f.record("A.md").await;
        assert!(record.tags.is_some());
        assert!(record.feature_image.is_some());
        assert_eq!(f.rasterizer.calls(), 2);
    }

    #[tokio::test]
    async fn test_stop_drops_queue() {
        let f = fixture(&[("A.md", "#one"), ("B.md", "#two")]);
        f.pipeline.index_all().await.unwrap();
        assert_eq!(f.pipeline.queue_len(), 8);
        f.pipeline.stop();
        assert_eq!(f.pipeline.queue_len(), 0);
        f.pipeline.wait_idle().await;
        assert!(f.cache.snapshot().await.is_empty());
    }
}
