use crate::error::{ErrorKind, Result};
use crate::job::ContentJob;
use crate::strategy::{ContentStrategy, Regeneration, regeneration};
use async_trait::async_trait;
use exn::ResultExt;
use tome_cache::FileRecord;
use tome_config::Settings;
use tome_extract::{ContentKind, preview};
use tome_storage::{DocumentStructure, StoreHandle};

/// Plain-text excerpt of a document.
pub struct PreviewProvider {
    store: StoreHandle,
}
impl PreviewProvider {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ContentStrategy for PreviewProvider {
    const KIND: ContentKind = ContentKind::Preview;
    type Scratch = ();
    type Output = String;

    fn enabled(&self, settings: &Settings) -> bool {
        settings.preview.enabled
    }

    async fn process_file(&self, job: &ContentJob<()>, _: Option<&FileRecord>, settings: &Settings) -> Result<Option<String>> {
        let text = self.store.read_to_string(job.path()).await.or_raise(|| ErrorKind::Storage)?;
        let structure = DocumentStructure::parse(&text);
        Ok(Some(preview(job.path(), &text, &structure, &settings.preview)))
    }

    fn should_regenerate(&self, old: &Settings, new: &Settings) -> Regeneration {
        regeneration(&old.preview, &new.preview, new.preview.enabled)
    }
}
