use super::{FeatureImagePatch, FieldPatch};
use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use std::path::PathBuf;
use tome_extract::{ContentKind, FileMetadata, TagSet};

/// Per-kind stamps: the file mtime each field was computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stamps {
    pub tags: Option<i64>,
    pub preview: Option<i64>,
    pub metadata: Option<i64>,
    pub feature_image: Option<i64>,
}
impl Stamps {
    pub fn get(&self, kind: ContentKind) -> Option<i64> {
        match kind {
            ContentKind::Tags => self.tags,
            ContentKind::Preview => self.preview,
            ContentKind::Metadata => self.metadata,
            ContentKind::FeatureImage => self.feature_image,
        }
    }

    pub fn set(&mut self, kind: ContentKind, mtime: Option<i64>) {
        let slot = match kind {
            ContentKind::Tags => &mut self.tags,
            ContentKind::Preview => &mut self.preview,
            ContentKind::Metadata => &mut self.metadata,
            ContentKind::FeatureImage => &mut self.feature_image,
        };
        *slot = mtime;
    }
}

/// Everything the cache knows about one vault path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Largest stamp ever written to this record.
    pub mtime: i64,
    pub tags: Option<TagSet>,
    pub preview: Option<String>,
    pub metadata: Option<FileMetadata>,
    pub feature_image: Option<String>,
    pub feature_image_resized: Option<String>,
    pub feature_image_provider: Option<PathBuf>,
    /// Files whose feature image is provided by this one.
    pub feature_image_consumers: Vec<PathBuf>,
    pub stamps: Stamps,
}
impl FileRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    pub fn stamp(&self, kind: ContentKind) -> Option<i64> {
        self.stamps.get(kind)
    }

    pub fn feature_image_patch(&self) -> FeatureImagePatch {
        FeatureImagePatch {
            image: self.feature_image.clone(),
            resized: self.feature_image_resized.clone(),
            provider: self.feature_image_provider.clone(),
        }
    }

    pub fn apply(&mut self, patch: &FieldPatch) {
        match patch {
            FieldPatch::Tags(tags) => self.tags = Some(tags.clone()),
            FieldPatch::Preview(preview) => self.preview = Some(preview.clone()),
            FieldPatch::Metadata(metadata) => self.metadata = Some(metadata.clone()),
            FieldPatch::FeatureImage(feature) => {
                self.feature_image = feature.image.clone();
                self.feature_image_resized = feature.resized.clone();
                self.feature_image_provider = feature.provider.clone();
            },
        }
    }

    /// Whether the record already holds the value `patch` would write.
    pub fn holds(&self, patch: &FieldPatch) -> bool {
        match patch {
            FieldPatch::Tags(tags) => self.tags.as_ref() == Some(tags),
            FieldPatch::Preview(preview) => self.preview.as_ref() == Some(preview),
            FieldPatch::Metadata(metadata) => self.metadata.as_ref() == Some(metadata),
            FieldPatch::FeatureImage(feature) => self.feature_image_patch() == *feature,
        }
    }

    /// Drop a kind's field and stamp.
    pub fn clear(&mut self, kind: ContentKind) {
        match kind {
            ContentKind::Tags => self.tags = None,
            ContentKind::Preview => self.preview = None,
            ContentKind::Metadata => self.metadata = None,
            ContentKind::FeatureImage => {
                self.feature_image = None;
                self.feature_image_resized = None;
                self.feature_image_provider = None;
                self.feature_image_consumers.clear();
            },
        }
        self.stamps.set(kind, None);
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RecordRow {
    path: String,
    mtime: i64,
    tags: Option<String>,
    tags_mtime: Option<i64>,
    preview: Option<String>,
    preview_mtime: Option<i64>,
    metadata: Option<String>,
    metadata_mtime: Option<i64>,
    feature_image: Option<String>,
    feature_image_resized: Option<String>,
    feature_image_provider: Option<String>,
    feature_image_mtime: Option<i64>,
    feature_image_consumers: String,
}
impl TryFrom<RecordRow> for FileRecord {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let tags = row
            .tags
            .map(|json| serde_json::from_str::<TagSet>(&json))
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("tags"))?;
        let metadata = row
            .metadata
            .map(|json| serde_json::from_str::<FileMetadata>(&json))
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("metadata"))?;
        let consumers: Vec<PathBuf> = serde_json::from_str(&row.feature_image_consumers)
            .or_raise(|| ErrorKind::InvalidData("feature image consumers"))?;
        Ok(Self {
            path: PathBuf::from(row.path),
            mtime: row.mtime,
            tags,
            preview: row.preview,
            metadata,
            feature_image: row.feature_image,
            feature_image_resized: row.feature_image_resized,
            feature_image_provider: row.feature_image_provider.map(PathBuf::from),
            feature_image_consumers: consumers,
            stamps: Stamps {
                tags: row.tags_mtime,
                preview: row.preview_mtime,
                metadata: row.metadata_mtime,
                feature_image: row.feature_image_mtime,
            },
        })
    }
}
