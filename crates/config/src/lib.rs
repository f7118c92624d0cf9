//! Settings for the vault indexer.
//!
//! One section per content kind plus scheduler tuning and on-disk paths.
//! Every field has a default, so an empty configuration is a valid one.
//! See [`Settings::load`] for where values come from.

pub mod error;
mod load;

pub use crate::load::{CONFIG_FILE_STEM, ENV_PREFIX, config_dir, data_dir};
use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_DEBOUNCE_MS: u64 = 100;
pub const DEFAULT_PREVIEW_LENGTH: usize = 300;
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 128;
pub const DEFAULT_RENDER_SIZE: u32 = 800;
pub const DEFAULT_RASTERIZER_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Quiet period after the last queued file before a batch starts.
    pub debounce_ms: u64,
    pub tags: TagSettings,
    pub preview: PreviewSettings,
    pub metadata: MetadataSettings,
    pub feature_image: FeatureImageSettings,
    pub rasterizers: RasterizerSettings,
    pub paths: PathSettings,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            tags: TagSettings::default(),
            preview: PreviewSettings::default(),
            metadata: MetadataSettings::default(),
            feature_image: FeatureImageSettings::default(),
            rasterizers: RasterizerSettings::default(),
            paths: PathSettings::default(),
        }
    }
}
impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.preview.max_length == 0 {
            exn::bail!(ErrorKind::Validation {
                field: "preview.max_length",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.feature_image.thumbnail_size == 0 {
            exn::bail!(ErrorKind::Validation {
                field: "feature_image.thumbnail_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.feature_image.render_size == 0 {
            exn::bail!(ErrorKind::Validation {
                field: "feature_image.render_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.rasterizers.timeout_secs == 0 {
            exn::bail!(ErrorKind::Validation {
                field: "rasterizers.timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (field, command) in [("rasterizers.pdf", &self.rasterizers.pdf), ("rasterizers.diagram", &self.rasterizers.diagram)] {
            if command.as_ref().is_some_and(|argv| argv.first().is_none_or(|program| program.trim().is_empty())) {
                exn::bail!(ErrorKind::Validation { field, reason: "command must name a program".to_string() });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSettings {
    pub enabled: bool,
    /// Extra frontmatter properties whose values are merged into the flat
    /// tag list, next to `tags`.
    pub alternate_properties: Vec<String>,
    /// Frontmatter properties kept as their own named tag lists.
    pub tag_properties: Vec<String>,
}
impl Default for TagSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            alternate_properties: Vec::new(),
            tag_properties: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    pub enabled: bool,
    /// Maximum preview length in characters, ellipsis included.
    pub max_length: usize,
    pub skip_headings: bool,
    pub skip_code_blocks: bool,
    pub skip_html: bool,
    /// Frontmatter properties used as the preview, in priority order, before
    /// falling back to the body.
    pub properties: Vec<String>,
}
impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: DEFAULT_PREVIEW_LENGTH,
            skip_headings: false,
            skip_code_blocks: true,
            skip_html: true,
            properties: vec!["description".to_string(), "summary".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    pub enabled: bool,
    pub name_property: Option<String>,
    pub created_property: Option<String>,
    /// `time` format description (`[year]-[month]-[day]`). Without one, ISO
    /// 8601 / RFC 3339 datetimes and plain dates are accepted.
    pub created_format: Option<String>,
    pub modified_property: Option<String>,
    pub modified_format: Option<String>,
    pub icon_property: Option<String>,
    pub color_property: Option<String>,
    /// Truthy frontmatter properties that hide a file.
    pub hidden_properties: Vec<String>,
    /// Glob patterns over vault paths that hide a file.
    pub hidden_patterns: Vec<String>,
}
impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            name_property: Some("title".to_string()),
            created_property: Some("created".to_string()),
            created_format: None,
            modified_property: Some("modified".to_string()),
            modified_format: None,
            icon_property: Some("icon".to_string()),
            color_property: Some("color".to_string()),
            hidden_properties: Vec::new(),
            hidden_patterns: Vec::new(),
        }
    }
}
impl MetadataSettings {
    /// Whether any exclusion rule is configured.
    pub fn hides_anything(&self) -> bool {
        !self.hidden_properties.is_empty() || !self.hidden_patterns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureImageSettings {
    pub enabled: bool,
    /// Frontmatter properties naming the feature image, in priority order.
    pub properties: Vec<String>,
    /// Fall back to the first embed of the document body.
    pub embed_fallback: bool,
    /// Diagrams preview themselves.
    pub self_preview: bool,
    /// Edge length of the square inline thumbnail, in pixels.
    pub thumbnail_size: u32,
    /// Width requested from rasterizers, in pixels.
    pub render_size: u32,
}
impl Default for FeatureImageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            properties: vec!["cover".to_string(), "image".to_string(), "banner".to_string()],
            embed_fallback: true,
            self_preview: true,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            render_size: DEFAULT_RENDER_SIZE,
        }
    }
}

/// External commands turning attachments into PNG renders.
///
/// A command is a program followed by its arguments. These placeholders are
/// substituted in the arguments: `{input}` (the attachment, copied to a
/// temporary file), `{output}` (the PNG to produce), `{output_stem}`
/// (`{output}` without the `.png` extension) and `{size}` (the render width).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizerSettings {
    /// PDF rasterizer. Defaults to `pdftoppm` when found on `PATH`.
    pub pdf: Option<Vec<String>>,
    /// Diagram rasterizer. Diagrams are not rendered unless this is set.
    pub diagram: Option<Vec<String>>,
    pub timeout_secs: u64,
}
impl Default for RasterizerSettings {
    fn default() -> Self {
        Self { pdf: None, diagram: None, timeout_secs: DEFAULT_RASTERIZER_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// SQLite cache database. Defaults to `cache.db` in the data directory.
    pub database: Option<PathBuf>,
    /// Directory for generated renders. Defaults to `renders/` in the data
    /// directory.
    pub renders: Option<PathBuf>,
}
impl PathSettings {
    pub fn database(&self) -> Option<PathBuf> {
        self.database.clone().or_else(|| data_dir().map(|dir| dir.join("cache.db")))
    }

    pub fn renders(&self) -> Option<PathBuf> {
        self.renders.clone().or_else(|| data_dir().map(|dir| dir.join("renders")))
    }
}
