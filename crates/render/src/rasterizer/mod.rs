//! Rasterizers turn attachments into PNG images.

mod command;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::command::CommandRasterizer;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockRasterizer;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tome_config::RasterizerSettings;
use tome_storage::{FileKind, FileRef, StoreHandle};

/// PNG bytes produced by a rasterizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Rasterizer {
    /// Name of the rasterizer, used for logging only.
    fn name(&self) -> &str;

    /// Render the first page (or the whole drawing) of `attachment`.
    /// `requesting` is the document that asked for the render.
    async fn render(&self, attachment: &FileRef, requesting: &Path) -> Result<RenderedImage>;
}

pub type RasterizerHandle = Arc<dyn Rasterizer + Send + Sync>;

/// Rasterizers keyed by the kind of attachment they handle.
#[derive(Clone, Default)]
pub struct RasterizerRegistry {
    by_kind: HashMap<FileKind, RasterizerHandle>,
}
impl RasterizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: FileKind, rasterizer: RasterizerHandle) -> Self {
        self.by_kind.insert(kind, rasterizer);
        self
    }

    /// Build the registry from settings, skipping (with a warning) any
    /// rasterizer whose program can't be found.
    pub fn from_settings(store: StoreHandle, settings: &RasterizerSettings, size: u32) -> Self {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let mut registry = Self::new();
        let pdf = match &settings.pdf {
            Some(argv) => CommandRasterizer::new(store.clone(), argv, size, timeout),
            None => CommandRasterizer::pdftoppm(store.clone(), size, timeout),
        };
        match pdf {
            Ok(rasterizer) => registry = registry.with(FileKind::Pdf, Arc::new(rasterizer)),
            Err(e) => tracing::warn!(error = %e, "PDF attachments will not be rendered"),
        }
        if let Some(argv) = &settings.diagram {
            match CommandRasterizer::new(store, argv, size, timeout) {
                Ok(rasterizer) => registry = registry.with(FileKind::Diagram, Arc::new(rasterizer)),
                Err(e) => tracing::warn!(error = %e, "diagrams will not be rendered"),
            }
        }
        registry
    }

    pub fn supports(&self, kind: FileKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    /// Render `attachment` with the rasterizer registered for `kind`. The
    /// kind is passed separately because a plain note can hold a diagram.
    pub async fn render(&self, kind: FileKind, attachment: &FileRef, requesting: &Path) -> Result<RenderedImage> {
        let Some(rasterizer) = self.by_kind.get(&kind) else {
            exn::bail!(ErrorKind::Unsupported(attachment.path.clone()));
        };
        tracing::debug!(
            rasterizer = rasterizer.name(),
            path = %attachment.path.display(),
            requesting = %requesting.display(),
            "rasterizing attachment",
        );
        rasterizer.render(attachment, requesting).await
    }
}
