use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// The four derived fields kept per file. Each kind is owned by exactly one
/// content strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Tags,
    Preview,
    Metadata,
    FeatureImage,
}
impl ContentKind {
    pub const ALL: [ContentKind; 4] = [Self::Tags, Self::Preview, Self::Metadata, Self::FeatureImage];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tags => "tags",
            Self::Preview => "preview",
            Self::Metadata => "metadata",
            Self::FeatureImage => "feature_image",
        }
    }
}
impl Display for ContentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown content kind `{s}` (expected one of: tags, preview, metadata, feature_image)"))
    }
}
