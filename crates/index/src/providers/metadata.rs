use crate::error::{ErrorKind, Result};
use crate::job::ContentJob;
use crate::strategy::{ContentStrategy, Regeneration, is_stale, regeneration};
use async_trait::async_trait;
use exn::ResultExt;
use std::sync::{Arc, Mutex};
use tome_cache::FileRecord;
use tome_config::{MetadataSettings, Settings};
use tome_extract::{ContentKind, FileMetadata, MetadataExtractor};
use tome_storage::{DocumentStructure, StoreHandle};

/// Worked out while checking a job, so the document is read only once.
#[derive(Debug, Default)]
pub struct MetadataScratch {
    structure: Option<DocumentStructure>,
    hidden: bool,
}

/// Display name, dates, icon, color and the hidden flag.
pub struct MetadataProvider {
    store: StoreHandle,
    /// Extractor compiled for the settings it was last asked about.
    compiled: Mutex<Option<(MetadataSettings, Arc<MetadataExtractor>)>>,
}
impl MetadataProvider {
    pub fn new(store: StoreHandle) -> Self {
        Self { store, compiled: Mutex::new(None) }
    }

    fn extractor(&self, settings: &MetadataSettings) -> Result<Arc<MetadataExtractor>> {
        let mut compiled = self.compiled.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((seen, extractor)) = compiled.as_ref()
            && seen == settings
        {
            return Ok(extractor.clone());
        }
        let extractor = Arc::new(MetadataExtractor::new(settings).or_raise(|| ErrorKind::Settings)?);
        *compiled = Some((settings.clone(), extractor.clone()));
        Ok(extractor)
    }
}

#[async_trait]
impl ContentStrategy for MetadataProvider {
    const KIND: ContentKind = ContentKind::Metadata;
    type Scratch = MetadataScratch;
    type Output = FileMetadata;

    fn enabled(&self, settings: &Settings) -> bool {
        settings.metadata.enabled
    }

    async fn needs_processing(
        &self,
        job: &mut ContentJob<MetadataScratch>,
        record: Option<&FileRecord>,
        settings: &Settings,
    ) -> Result<bool> {
        if !self.enabled(settings) || !job.file.kind().is_document() || !is_stale::<Self>(job, record) {
            return Ok(false);
        }
        let extractor = self.extractor(&settings.metadata)?;
        if extractor.hides_anything() {
            let structure = self.store.structure(job.path()).await.or_raise(|| ErrorKind::Storage)?;
            job.scratch.hidden = extractor.is_hidden(job.path(), &structure);
            job.scratch.structure = Some(structure);
        }
        Ok(true)
    }

    async fn process_file(
        &self,
        job: &ContentJob<MetadataScratch>,
        _: Option<&FileRecord>,
        settings: &Settings,
    ) -> Result<Option<FileMetadata>> {
        let extractor = self.extractor(&settings.metadata)?;
        let metadata = match &job.scratch.structure {
            Some(structure) => extractor.extract(structure, job.scratch.hidden),
            None => {
                let structure = self.store.structure(job.path()).await.or_raise(|| ErrorKind::Storage)?;
                extractor.extract(&structure, job.scratch.hidden)
            },
        };
        Ok(Some(metadata))
    }

    fn should_regenerate(&self, old: &Settings, new: &Settings) -> Regeneration {
        regeneration(&old.metadata, &new.metadata, new.metadata.enabled)
    }
}
