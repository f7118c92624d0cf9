use std::path::PathBuf;
use tome_extract::{ContentKind, FileMetadata, TagSet};

/// Feature image fields, always written together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureImagePatch {
    /// Link or URL of the full-size image.
    pub image: Option<String>,
    /// Thumbnail as a `data:` URL.
    pub resized: Option<String>,
    /// Vault file the image came from, when it came from one.
    pub provider: Option<PathBuf>,
}
impl FeatureImagePatch {
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.resized.is_none() && self.provider.is_none()
    }
}

/// A new value for exactly one derived field.
///
/// Each variant belongs to one [`ContentKind`], which keeps every kind's
/// writes confined to the columns it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPatch {
    Tags(TagSet),
    Preview(String),
    Metadata(FileMetadata),
    FeatureImage(FeatureImagePatch),
}
impl FieldPatch {
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Tags(_) => ContentKind::Tags,
            Self::Preview(_) => ContentKind::Preview,
            Self::Metadata(_) => ContentKind::Metadata,
            Self::FeatureImage(_) => ContentKind::FeatureImage,
        }
    }
}
impl From<TagSet> for FieldPatch {
    fn from(tags: TagSet) -> Self {
        Self::Tags(tags)
    }
}
impl From<String> for FieldPatch {
    fn from(preview: String) -> Self {
        Self::Preview(preview)
    }
}
impl From<FileMetadata> for FieldPatch {
    fn from(metadata: FileMetadata) -> Self {
        Self::Metadata(metadata)
    }
}
impl From<FeatureImagePatch> for FieldPatch {
    fn from(patch: FeatureImagePatch) -> Self {
        Self::FeatureImage(patch)
    }
}

/// Output of processing one file for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub path: PathBuf,
    pub patch: FieldPatch,
}
impl ProcessResult {
    pub fn new(path: impl Into<PathBuf>, patch: impl Into<FieldPatch>) -> Self {
        Self { path: path.into(), patch: patch.into() }
    }
}
