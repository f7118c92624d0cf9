//! Finding the image that represents a document.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use tome_config::FeatureImageSettings;
use tome_extract::is_diagram;
use tome_render::RasterizerRegistry;
use tome_storage::{DocumentStore, DocumentStructure, FileKind, FileRef, is_external, link_target};

/// Where a document's feature image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    None,
    /// An image used as is: a vault image (`file`) or an external URL.
    Direct { image: String, file: Option<FileRef> },
    /// An attachment that has to be rasterized first.
    Generated { attachment: FileRef, kind: FileKind },
}

/// What a single link points at, as far as feature images are concerned.
enum Target {
    Unresolved,
    Usable(Resolution),
    Unusable,
}

pub(crate) struct Resolver<'a> {
    pub store: &'a dyn DocumentStore,
    pub rasterizers: &'a RasterizerRegistry,
    pub settings: &'a FeatureImageSettings,
}
impl Resolver<'_> {
    /// Self preview, then the configured properties in priority order, then
    /// (optionally) the first usable embed of the body.
    pub async fn resolve(&self, file: &FileRef, structure: &DocumentStructure) -> Result<Resolution> {
        if self.settings.self_preview
            && is_diagram(&file.path, structure)
            && self.rasterizers.supports(FileKind::Diagram)
        {
            return Ok(Resolution::Generated { attachment: file.clone(), kind: FileKind::Diagram });
        }

        for key in &self.settings.properties {
            for value in structure.property_strings(key) {
                if let Target::Usable(resolution) = self.target(&value, file).await? {
                    tracing::trace!(path = %file.path.display(), property = %key, "feature image from property");
                    return Ok(resolution);
                }
            }
        }

        if !self.settings.embed_fallback {
            return Ok(Resolution::None);
        }
        for embed in &structure.embeds {
            match self.target(embed, file).await? {
                Target::Usable(resolution) => return Ok(resolution),
                Target::Unresolved => continue,
                // The first real embed decides; a document that leads with
                // an audio clip has no feature image.
                Target::Unusable => return Ok(Resolution::None),
            }
        }
        Ok(Resolution::None)
    }

    async fn target(&self, raw: &str, source: &FileRef) -> Result<Target> {
        let Some(target) = link_target(raw) else {
            return Ok(Target::Unresolved);
        };
        if is_external(&target) {
            return Ok(Target::Usable(Resolution::Direct { image: target, file: None }));
        }
        let resolved = self.store.resolve_link(&target, &source.path).await.or_raise(|| ErrorKind::Storage)?;
        let Some(attachment) = resolved else {
            return Ok(Target::Unresolved);
        };
        Ok(match attachment.kind() {
            FileKind::Image => Target::Usable(Resolution::Direct {
                image: attachment.path.to_string_lossy().into_owned(),
                file: Some(attachment),
            }),
            kind @ (FileKind::Pdf | FileKind::Diagram) if self.rasterizers.supports(kind) => {
                Target::Usable(Resolution::Generated { attachment, kind })
            },
            _ => Target::Unusable,
        })
    }
}
