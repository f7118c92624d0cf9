//! Read-only access to a vault of notes and attachments.
//!
//! The indexing pipeline never writes to the vault; it only enumerates files,
//! reads their contents and asks for the structural metadata (frontmatter,
//! inline tags, embeds) of markdown documents. Everything goes through the
//! [`DocumentStore`] trait so the host application can plug in its own index.

pub mod backend;
pub mod error;
pub mod file;
mod link;
mod path;
pub mod structure;

pub use crate::backend::DocumentStore;
pub use crate::file::{FileEvent, FileKind, FileRef};
pub use crate::link::{is_external, link_target, resolve_among};
pub use crate::path::{segments as path_segments, validate as validate_path};
pub use crate::structure::DocumentStructure;
use std::sync::Arc;

pub type StoreHandle = Arc<dyn DocumentStore + Send + Sync>;
