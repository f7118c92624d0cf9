//! Provider/consumer bookkeeping for generated renders.
//!
//! A *provider* is an attachment (PDF, diagram) that was rasterized; its
//! *consumers* are the documents showing that render as their feature image.
//! Both directions live in the cache: each consumer's record names its
//! provider, and the provider's record lists its consumers. The consumer
//! side is written by the scheduler with the rest of the feature image
//! patch; this module owns the provider side and the render files. A
//! consumer is listed only once its own record is stored, so every listed
//! consumer's record names the provider listing it.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as SyncMutex};
use tokio::sync::Mutex;
use tome_cache::{CacheHandle, FeatureImagePatch};
use tome_render::{RasterizerRegistry, RenderCache, thumbnail};
use tome_storage::{FileKind, FileRef};
use tracing::instrument;

pub struct DependencyTracker {
    cache: CacheHandle,
    renders: RenderCache,
    rasterizers: RasterizerRegistry,
    /// Serializes every read-modify-write of a consumer list.
    graph: Mutex<()>,
    /// One lock per render file, so an attachment is rasterized once no
    /// matter how many documents ask for it at the same time.
    render_locks: SyncMutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DependencyTracker {
    pub fn new(cache: CacheHandle, renders: RenderCache, rasterizers: RasterizerRegistry) -> Self {
        Self { cache, renders, rasterizers, graph: Mutex::new(()), render_locks: SyncMutex::new(HashMap::new()) }
    }

    pub fn rasterizers(&self) -> &RasterizerRegistry {
        &self.rasterizers
    }

    pub fn renders(&self) -> &RenderCache {
        &self.renders
    }

    fn render_lock(&self, render: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.render_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(render.to_path_buf()).or_default().clone()
    }

    /// Forget render locks nobody holds any more.
    fn prune_render_locks(&self) {
        let mut locks = self.render_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Produce (or reuse) the render of `attachment` for `consumer` and
    /// return the patch to store for the consumer. Neither the provider's
    /// consumer list nor any old render is touched until the patch is
    /// stored; see [`commit()`](Self::commit).
    #[instrument(skip(self, attachment, previous), fields(attachment = %attachment.path.display()))]
    pub async fn acquire(
        &self,
        consumer: &Path,
        attachment: &FileRef,
        kind: FileKind,
        previous: &FeatureImagePatch,
        thumbnail_size: u32,
    ) -> Result<FeatureImagePatch> {
        let render = self.renders.path_for(attachment);
        let image = render.to_string_lossy().into_owned();
        let lock = self.render_lock(&render);
        let resized = {
            let _guard = lock.lock().await;
            let reuse = previous.image.as_deref() == Some(image.as_str()) && self.renders.exists(&render).await;
            if !reuse && !self.renders.exists(&render).await {
                let rendered = self
                    .rasterizers
                    .render(kind, attachment, consumer)
                    .await
                    .or_raise(|| ErrorKind::Render)?;
                self.renders.write(&render, &rendered.bytes).await.or_raise(|| ErrorKind::Render)?;
                tracing::info!(render = %render.display(), "render generated");
            }
            match (reuse, &previous.resized) {
                (true, Some(resized)) => Some(resized.clone()),
                _ => self.thumbnail_of(&render, thumbnail_size).await,
            }
        };
        drop(lock);
        self.prune_render_locks();
        Ok(FeatureImagePatch { image: Some(image), resized, provider: Some(attachment.path.clone()) })
    }

    /// `current` was just stored for `consumer` in place of `previous`.
    /// Leave the old provider, delete the render it no longer shows and list
    /// the consumer with its new provider. Returns `false` if the stored
    /// render has disappeared meanwhile.
    #[instrument(skip(self, previous, current))]
    pub async fn commit(&self, consumer: &Path, previous: &FeatureImagePatch, current: &FeatureImagePatch) -> Result<bool> {
        if let Some(old) = previous.provider.as_deref() {
            let stale = previous.image.as_deref().map(Path::new);
            if current.provider.as_deref() != Some(old) {
                self.detach(consumer, old, stale).await?;
            } else if let Some(stale) = stale.filter(|stale| current.image.as_deref().map(Path::new) != Some(*stale)) {
                self.remove_if_unused(old, stale).await?;
            }
        }
        let Some(provider) = current.provider.as_deref() else {
            return Ok(true);
        };
        let render = current.image.as_deref().map(Path::new);
        let lock = render.map(|render| self.render_lock(render));
        let present = {
            let _render = match &lock {
                Some(lock) => Some(lock.lock().await),
                None => None,
            };
            let _graph = self.graph.lock().await;
            let mut consumers = self.consumers_of(provider).await?;
            if !consumers.iter().any(|c| c == consumer) {
                consumers.push(consumer.to_path_buf());
                self.cache.set_consumers(provider, &consumers).await.or_raise(|| ErrorKind::Cache)?;
            }
            match render {
                Some(render) => self.renders.exists(render).await,
                None => true,
            }
        };
        drop(lock);
        self.prune_render_locks();
        Ok(present)
    }

    /// `current` was computed for `consumer` but will never be stored.
    /// Its render goes unless a listed consumer shows it.
    #[instrument(skip(self, previous, current))]
    pub async fn discard(&self, consumer: &Path, previous: &FeatureImagePatch, current: &FeatureImagePatch) -> Result<()> {
        match (current.provider.as_deref(), current.image.as_deref()) {
            (Some(provider), Some(image)) if previous.image.as_deref() != Some(image) => {
                self.remove_if_unused(provider, Path::new(image)).await
            },
            _ => Ok(()),
        }
    }

    /// Delete `render` unless a listed consumer of `provider` shows it.
    async fn remove_if_unused(&self, provider: &Path, render: &Path) -> Result<()> {
        let lock = self.render_lock(render);
        {
            let _render = lock.lock().await;
            let _graph = self.graph.lock().await;
            let consumers = self.consumers_of(provider).await?;
            if !self.renders_of(provider, &consumers).await?.iter().any(|shown| shown == render) {
                self.remove_render(render).await;
            }
        }
        drop(lock);
        self.prune_render_locks();
        Ok(())
    }

    async fn thumbnail_of(&self, render: &Path, size: u32) -> Option<String> {
        let bytes = match self.renders.read(render).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(render = %render.display(), error = ?e, "could not read render");
                return None;
            },
        };
        match thumbnail(bytes, size).await {
            Ok(resized) => Some(resized),
            Err(e) => {
                tracing::warn!(render = %render.display(), error = ?e, "could not thumbnail render");
                None
            },
        }
    }

    async fn remove_render(&self, render: &Path) {
        if let Err(e) = self.renders.remove(render).await {
            tracing::warn!(render = %render.display(), error = ?e, "could not delete render");
        }
    }

    async fn consumers_of(&self, provider: &Path) -> Result<Vec<PathBuf>> {
        let record = self.cache.get_record(provider).await.or_raise(|| ErrorKind::Cache)?;
        Ok(record.map(|r| r.feature_image_consumers).unwrap_or_default())
    }

    /// Store a provider's consumer list. A provider nobody uses any more
    /// keeps no record unless it is a document with content of its own.
    async fn store_consumers(&self, provider: &Path, consumers: &[PathBuf]) -> Result<()> {
        let result = match consumers.is_empty() {
            false => self.cache.set_consumers(provider, consumers).await,
            true if !FileKind::from_path(provider).is_document() => self.cache.delete_record(provider).await,
            true => match self.cache.record_exists(provider).await {
                Ok(true) => self.cache.set_consumers(provider, consumers).await,
                other => other.map(|_| ()),
            },
        };
        result.or_raise(|| ErrorKind::Cache)
    }

    /// Consumers of `provider` that still point back at it. A consumer is
    /// only listed after its record names the provider, so entries whose
    /// record is gone or names another provider (or none) are stale. They
    /// are dropped and the list is rewritten without them.
    async fn live_consumers(&self, provider: &Path) -> Result<Vec<PathBuf>> {
        let listed = self.consumers_of(provider).await?;
        let mut live = Vec::with_capacity(listed.len());
        for consumer in &listed {
            let record = self.cache.get_record(consumer).await.or_raise(|| ErrorKind::Cache)?;
            let points_here = record.as_ref().and_then(|r| r.feature_image_provider.as_deref()) == Some(provider);
            if points_here {
                live.push(consumer.clone());
            } else {
                tracing::debug!(provider = %provider.display(), consumer = %consumer.display(), "dropping stale consumer");
            }
        }
        if live.len() != listed.len() {
            self.store_consumers(provider, &live).await?;
        }
        Ok(live)
    }

    /// Remove `consumer` from `provider`'s list, deleting the render once
    /// nobody uses it.
    #[instrument(skip(self))]
    pub async fn detach(&self, consumer: &Path, provider: &Path, render: Option<&Path>) -> Result<()> {
        let lock = render.map(|render| self.render_lock(render));
        {
            let _render = match &lock {
                Some(lock) => Some(lock.lock().await),
                None => None,
            };
            let _graph = self.graph.lock().await;
            let mut consumers = self.consumers_of(provider).await?;
            let before = consumers.len();
            consumers.retain(|c| c != consumer);
            if consumers.is_empty() {
                if let Some(render) = render {
                    self.remove_render(render).await;
                }
                self.store_consumers(provider, &consumers).await?;
            } else if consumers.len() != before {
                self.store_consumers(provider, &consumers).await?;
            }
        }
        drop(lock);
        self.prune_render_locks();
        Ok(())
    }

    /// Renders shown by the given consumers on behalf of `provider`.
    async fn renders_of(&self, provider: &Path, consumers: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut renders = Vec::new();
        for consumer in consumers {
            let record = self.cache.get_record(consumer).await.or_raise(|| ErrorKind::Cache)?;
            if let Some(record) = record
                && record.feature_image_provider.as_deref() == Some(provider)
                && let Some(image) = record.feature_image
            {
                let image = PathBuf::from(image);
                if !renders.contains(&image) {
                    renders.push(image);
                }
            }
        }
        Ok(renders)
    }

    /// `provider` is gone (deleted or renamed away): delete its renders and
    /// its consumer list. Returns the consumers that need to pick a new
    /// feature image.
    #[instrument(skip(self))]
    pub async fn mark_provider_deleted(&self, provider: &Path) -> Result<Vec<PathBuf>> {
        let _graph = self.graph.lock().await;
        let consumers = self.live_consumers(provider).await?;
        for render in self.renders_of(provider, &consumers).await? {
            self.remove_render(&render).await;
        }
        self.store_consumers(provider, &[]).await?;
        Ok(consumers.into_iter().filter(|c| c != provider).collect())
    }

    /// `provider` changed on disk: its renders are out of date. The consumer
    /// list is kept; consumers re-acquire on their next pass. Returns them.
    #[instrument(skip(self))]
    pub async fn provider_changed(&self, provider: &Path) -> Result<Vec<PathBuf>> {
        let _graph = self.graph.lock().await;
        let consumers = self.live_consumers(provider).await?;
        for render in self.renders_of(provider, &consumers).await? {
            self.remove_render(&render).await;
        }
        Ok(consumers.into_iter().filter(|c| c != provider).collect())
    }

    /// Rewrite `from` to `to` in `provider`'s consumer list.
    #[instrument(skip(self))]
    pub async fn rename_consumer(&self, provider: &Path, from: &Path, to: &Path) -> Result<()> {
        let _graph = self.graph.lock().await;
        let consumers = self.consumers_of(provider).await?;
        if !consumers.iter().any(|c| c == from) {
            return Ok(());
        }
        let mut renamed: Vec<PathBuf> = Vec::with_capacity(consumers.len());
        for consumer in consumers {
            let consumer = if consumer == from { to.to_path_buf() } else { consumer };
            if !renamed.contains(&consumer) {
                renamed.push(consumer);
            }
        }
        self.store_consumers(provider, &renamed).await
    }
}
