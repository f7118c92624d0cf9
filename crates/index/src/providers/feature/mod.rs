//! Feature images: the picture shown for a document in card and gallery
//! views.

mod dependencies;
mod resolve;
mod tracker;

pub use self::dependencies::FeatureImageDependencies;
pub use self::tracker::DependencyTracker;

use self::resolve::{Resolution, Resolver};
use crate::error::{ErrorKind, Result};
use crate::job::ContentJob;
use crate::strategy::{ContentStrategy, Regeneration, regeneration};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use tome_cache::{FeatureImagePatch, FileRecord};
use tome_config::Settings;
use tome_extract::ContentKind;
use tome_render::thumbnail;
use tome_storage::error::ErrorKind as StorageErrorKind;
use tome_storage::{FileRef, StoreHandle};

pub struct FeatureImageProvider {
    store: StoreHandle,
    tracker: Arc<DependencyTracker>,
}
impl FeatureImageProvider {
    pub fn new(store: StoreHandle, tracker: Arc<DependencyTracker>) -> Self {
        Self { store, tracker }
    }

    pub fn tracker(&self) -> &Arc<DependencyTracker> {
        &self.tracker
    }

    /// Whether the attachment behind a generated image still exists.
    async fn provider_exists(&self, provider: &Path) -> Result<bool> {
        match self.store.stat(provider).await {
            Ok(_) => Ok(true),
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => Ok(false),
            Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
        }
    }

    async fn direct_thumbnail(&self, image: &FileRef, size: u32) -> Option<String> {
        // Vector images can't be decoded; the full image is shown instead.
        let is_svg = image.path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
        if is_svg {
            return None;
        }
        let bytes = match self.store.read(&image.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %image.path.display(), error = ?e, "could not read feature image");
                return None;
            },
        };
        match thumbnail(bytes, size).await {
            Ok(resized) => Some(resized),
            Err(e) => {
                tracing::warn!(path = %image.path.display(), error = ?e, "could not thumbnail feature image");
                None
            },
        }
    }
}

#[async_trait]
impl ContentStrategy for FeatureImageProvider {
    const KIND: ContentKind = ContentKind::FeatureImage;
    type Scratch = ();
    type Output = FeatureImagePatch;

    fn enabled(&self, settings: &Settings) -> bool {
        settings.feature_image.enabled
    }

    async fn process_file(
        &self,
        job: &ContentJob<()>,
        record: Option<&FileRecord>,
        settings: &Settings,
    ) -> Result<Option<FeatureImagePatch>> {
        let previous = record.map(FileRecord::feature_image_patch).unwrap_or_default();
        let structure = self.store.structure(job.path()).await.or_raise(|| ErrorKind::Storage)?;
        let resolver = Resolver {
            store: self.store.as_ref(),
            rasterizers: self.tracker.rasterizers(),
            settings: &settings.feature_image,
        };
        let size = settings.feature_image.thumbnail_size;
        let patch = match resolver.resolve(&job.file, &structure).await? {
            Resolution::None => FeatureImagePatch::default(),
            Resolution::Direct { image, file } => {
                let resized = match &file {
                    Some(file) => self.direct_thumbnail(file, size).await,
                    None => None,
                };
                FeatureImagePatch { image: Some(image), resized, provider: None }
            },
            Resolution::Generated { attachment, kind } => {
                self.tracker.acquire(job.path(), &attachment, kind, &previous, size).await?
            },
        };
        Ok(Some(patch))
    }

    /// Provider bookkeeping for the stored patch. The file goes round again
    /// if its render vanished, or its attachment was deleted, while it was
    /// being processed.
    async fn committed(
        &self,
        job: &ContentJob<()>,
        record: Option<&FileRecord>,
        patch: &FeatureImagePatch,
    ) -> Result<bool> {
        let previous = record.map(FileRecord::feature_image_patch).unwrap_or_default();
        let present = self.tracker.commit(job.path(), &previous, patch).await?;
        let orphaned = match patch.provider.as_deref() {
            Some(provider) if provider != job.path() => !self.provider_exists(provider).await?,
            _ => false,
        };
        if !present || orphaned {
            tracing::debug!(path = %job.path().display(), present, orphaned, "feature image outdated on arrival");
        }
        Ok(!present || orphaned)
    }

    async fn discarded(&self, job: &ContentJob<()>, record: Option<&FileRecord>, patch: &FeatureImagePatch) {
        let previous = record.map(FileRecord::feature_image_patch).unwrap_or_default();
        if let Err(e) = self.tracker.discard(job.path(), &previous, patch).await {
            tracing::warn!(path = %job.path().display(), error = ?e, "could not drop uncommitted render");
        }
    }

    fn should_regenerate(&self, old: &Settings, new: &Settings) -> Regeneration {
        regeneration(
            &(&old.feature_image, &old.rasterizers),
            &(&new.feature_image, &new.rasterizers),
            new.feature_image.enabled,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tome_cache::{ContentCache, MemoryCache, ProcessResult};
    use tome_render::{DATA_URL_PREFIX, MockRasterizer, RasterizerRegistry, RenderCache};
    use tome_storage::FileKind;
    use tome_storage::backend::MockStore;

    struct Fixture {
        provider: FeatureImageProvider,
        store: Arc<MockStore>,
        cache: Arc<MemoryCache>,
        rasterizer: Arc<MockRasterizer>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MockStore::default());
        let cache = Arc::new(MemoryCache::new());
        let rasterizer = Arc::new(MockRasterizer::new());
        let registry = RasterizerRegistry::new().with(FileKind::Pdf, rasterizer.clone());
        let tracker = DependencyTracker::new(cache.clone(), RenderCache::new(dir.path()), registry);
        let provider = FeatureImageProvider::new(store.clone(), Arc::new(tracker));
        Fixture { provider, store, cache, rasterizer, _dir: dir }
    }

    impl Fixture {
        /// Process and commit, the way the scheduler does.
        async fn process(&self, file: FileRef) -> FeatureImagePatch {
            let record = self.cache.get_record(&file.path).await.unwrap();
            let job = ContentJob::new(file, false);
            let settings = Settings::default();
            let patch = self.provider.process_file(&job, record.as_ref(), &settings).await.unwrap().unwrap();
            self.cache.batch_update(&[ProcessResult::new(job.path().clone(), patch.clone())]).await.unwrap();
            assert!(!self.provider.committed(&job, record.as_ref(), &patch).await.unwrap());
            patch
        }
    }

    #[tokio::test]
    async fn test_direct_image_thumbnail() {
        let f = fixture();
        f.store.write("img/cover.png", MockRasterizer::png()).await;
        let note = f.store.write("Note.md", "---\ncover: \"[[cover.png]]\"\n---\n").await;
        let patch = f.process(note).await;
        assert_eq!(patch.image.as_deref(), Some("img/cover.png"));
        assert!(patch.resized.as_deref().is_some_and(|r| r.starts_with(DATA_URL_PREFIX)));
        assert_eq!(patch.provider, None);
    }

    #[tokio::test]
    async fn test_undecodable_images_have_no_thumbnail() {
        let f = fixture();
        f.store.write("logo.svg", "<svg/>").await;
        f.store.write("broken.png", "not a png").await;
        let note = f.store.write("A.md", "![[logo.svg]]").await;
        assert_eq!(f.process(note).await.resized, None);
        let note = f.store.write("B.md", "![[broken.png]]").await;
        let patch = f.process(note).await;
        assert_eq!(patch.image.as_deref(), Some("broken.png"));
        assert_eq!(patch.resized, None);
    }

    #[tokio::test]
    async fn test_removed_embed_releases_render() {
        let f = fixture();
        f.store.write("Manual.pdf", "%PDF").await;
        let note = f.store.write("Note.md", "See ![[Manual.pdf]]").await;
        let patch = f.process(note).await;
        assert_eq!(patch.provider.as_deref(), Some(Path::new("Manual.pdf")));
        let render = patch.image.clone().unwrap();
        assert!(f.provider.tracker().renders().exists(Path::new(&render)).await);

        let note = f.store.write("Note.md", "No more attachments").await;
        let patch = f.process(note).await;
        assert!(patch.is_empty());
        assert!(!f.provider.tracker().renders().exists(Path::new(&render)).await);
        assert!(!f.cache.record_exists(Path::new("Manual.pdf")).await.unwrap());
        assert_eq!(f.rasterizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_note_reuses_render() {
        let f = fixture();
        f.store.write("Manual.pdf", "%PDF").await;
        let note = f.store.write("Note.md", "![[Manual.pdf]]").await;
        let first = f.process(note.clone()).await;
        let second = f.process(note).await;
        assert_eq!(first, second);
        assert_eq!(f.rasterizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_deleted_attachment_asks_for_another_pass() {
        let f = fixture();
        f.store.write("Manual.pdf", "%PDF").await;
        let note = f.store.write("Note.md", "![[Manual.pdf]]").await;
        let job = ContentJob::new(note, false);
        let settings = Settings::default();
        let patch = f.provider.process_file(&job, None, &settings).await.unwrap().unwrap();
        // The attachment disappears before the result is stored.
        f.store.delete("Manual.pdf").await.unwrap();
        f.cache.batch_update(&[ProcessResult::new("Note.md", patch.clone())]).await.unwrap();
        assert!(f.provider.committed(&job, None, &patch).await.unwrap());

        // The second pass resolves to nothing and lets go of the render.
        let record = f.cache.get_record(Path::new("Note.md")).await.unwrap();
        let job = ContentJob::new(job.file.clone(), true);
        let again = f.provider.process_file(&job, record.as_ref(), &settings).await.unwrap().unwrap();
        assert!(again.is_empty());
        f.cache.batch_update(&[ProcessResult::new("Note.md", again.clone())]).await.unwrap();
        assert!(!f.provider.committed(&job, record.as_ref(), &again).await.unwrap());
        assert!(!f.provider.tracker().renders().exists(Path::new(patch.image.as_deref().unwrap())).await);
        assert!(!f.cache.record_exists(Path::new("Manual.pdf")).await.unwrap());
    }

    #[tokio::test]
    async fn test_discarded_patch_drops_its_render() {
        let f = fixture();
        f.store.write("Manual.pdf", "%PDF").await;
        let note = f.store.write("Note.md", "![[Manual.pdf]]").await;
        let job = ContentJob::new(note, false);
        let patch = f.provider.process_file(&job, None, &Settings::default()).await.unwrap().unwrap();
        let render = patch.image.clone().unwrap();
        assert!(f.provider.tracker().renders().exists(Path::new(&render)).await);
        f.provider.discarded(&job, None, &patch).await;
        assert!(!f.provider.tracker().renders().exists(Path::new(&render)).await);
        assert!(!f.cache.record_exists(Path::new("Manual.pdf")).await.unwrap());
    }

    #[test]
    fn test_rasterizer_settings_trigger_reprocess() {
        let f = fixture();
        let old = Settings::default();
        let mut new = old.clone();
        new.rasterizers.timeout_secs += 1;
        assert_eq!(f.provider.should_regenerate(&old, &new), Regeneration::Reprocess);
    }
}
