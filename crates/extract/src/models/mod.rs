mod kind;
mod metadata;
pub(crate) mod tags;

pub use self::kind::ContentKind;
pub use self::metadata::{FileMetadata, Stamp};
pub use self::tags::TagSet;

/// Case-insensitive identity of a tag, ignoring a leading `#`.
fn fold(s: impl AsRef<str>) -> String {
    s.as_ref().trim().trim_start_matches('#').to_lowercase()
}
