//! Pure extraction of derived content from vault documents.
//!
//! Everything here works on text and a parsed
//! [`DocumentStructure`](tome_storage::DocumentStructure); no I/O happens in
//! this crate.

mod consts;
pub mod error;
mod metadata;
pub mod models;
mod preview;
mod tags;

pub use crate::metadata::MetadataExtractor;
pub use crate::models::{ContentKind, FileMetadata, Stamp, TagSet};
pub use crate::preview::{is_diagram, preview};
pub use crate::tags::extract_tags;
