use crate::error::{ErrorKind, Result};
use crate::job::ContentJob;
use crate::strategy::{ContentStrategy, Regeneration, regeneration};
use async_trait::async_trait;
use exn::ResultExt;
use tome_cache::FileRecord;
use tome_config::Settings;
use tome_extract::{ContentKind, TagSet, extract_tags};
use tome_storage::StoreHandle;

/// Inline and frontmatter tags.
pub struct TagProvider {
    store: StoreHandle,
}
impl TagProvider {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ContentStrategy for TagProvider {
    const KIND: ContentKind = ContentKind::Tags;
    type Scratch = ();
    type Output = TagSet;

    fn enabled(&self, settings: &Settings) -> bool {
        settings.tags.enabled
    }

    async fn process_file(
        &self,
        job: &ContentJob<()>,
        record: Option<&FileRecord>,
        settings: &Settings,
    ) -> Result<Option<TagSet>> {
        let structure = self.store.structure(job.path()).await.or_raise(|| ErrorKind::Storage)?;
        let tags = extract_tags(&structure, &settings.tags);
        // The host's structure index can lag a write by a moment and report a
        // tagged file as untagged. An empty read for a file whose cached tags
        // were taken from this very revision is not trusted.
        let had_tags = record.is_some_and(|r| {
            r.tags.as_ref().is_some_and(|t| !t.is_empty()) && r.stamp(Self::KIND) == Some(job.file.mtime)
        });
        if had_tags && tags.is_empty() {
            tracing::debug!(path = %job.path().display(), "ignoring empty tag read; keeping cached tags");
            return Ok(None);
        }
        Ok(Some(tags))
    }

    fn should_regenerate(&self, old: &Settings, new: &Settings) -> Regeneration {
        regeneration(&old.tags, &new.tags, new.tags.enabled)
    }
}
