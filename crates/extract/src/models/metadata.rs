use serde::{Deserialize, Serialize};

/// A timestamp read from frontmatter, or the reason there isn't one.
///
/// A metadata field that is simply missing from the document is stored as
/// `None`, so readers can tell all three situations apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Stamp {
    /// Milliseconds since the Unix epoch, UTC.
    Value(i64),
    /// No frontmatter property is configured for this field.
    NotConfigured,
    /// The property is present but its value did not parse.
    ParseFailed,
}
impl Stamp {
    pub fn value(&self) -> Option<i64> {
        match self {
            Self::Value(ms) => Some(*ms),
            _ => None,
        }
    }
}

/// Display metadata derived from frontmatter and exclusion rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: Option<String>,
    pub created: Option<Stamp>,
    pub modified: Option<Stamp>,
    pub icon: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}
