//! File references and change events.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg", "avif", "tif", "tiff", "ico"];
const DIAGRAM_SUFFIX: &str = ".excalidraw.md";

/// A file in the vault, as last seen by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef {
    /// Relative path from the vault root
    pub path: PathBuf,
    /// Last modified timestamp, milliseconds since the Unix epoch
    pub mtime: i64,
    /// File size in bytes
    pub size: u64,
}
impl FileRef {
    pub fn new(path: impl Into<PathBuf>, mtime: i64, size: u64) -> Self {
        Self { path: path.into(), mtime, size }
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_path(&self.path)
    }

    /// File name without its extension(s). Diagram documents lose both the
    /// `.excalidraw` and the `.md` suffix.
    pub fn basename(&self) -> String {
        let name = self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if let Some(stripped) = strip_suffix_ignore_case(&name, DIAGRAM_SUFFIX) {
            return stripped.to_string();
        }
        match self.path.file_stem() {
            Some(stem) => stem.to_string_lossy().into_owned(),
            None => name,
        }
    }
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    match name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(suffix) {
        true => Some(&name[..split]),
        false => None,
    }
}

/// Coarse classification of vault files by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// A markdown note.
    Markdown,
    /// A diagram drawing (`*.excalidraw` or `*.excalidraw.md`).
    Diagram,
    /// A PDF attachment.
    Pdf,
    /// Any image format the vault can display directly.
    Image,
    /// Anything else.
    Other,
}
impl FileKind {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if strip_suffix_ignore_case(&name, DIAGRAM_SUFFIX).is_some() {
            return Self::Diagram;
        }
        let extension = path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
        match extension.as_str() {
            "md" | "markdown" => Self::Markdown,
            "excalidraw" => Self::Diagram,
            "pdf" => Self::Pdf,
            ext if IMAGE_EXTENSIONS.contains(&ext) => Self::Image,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Diagram => "diagram",
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Other => "other",
        }
    }

    /// Markdown-bearing files that have frontmatter, a body and embeds.
    pub fn is_document(&self) -> bool {
        matches!(self, Self::Markdown | Self::Diagram)
    }
}
impl Display for FileKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Change notifications delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(FileRef),
    Modified(FileRef),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: FileRef },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("notes/a.md", FileKind::Markdown)]
    #[case("Drawings/flow.excalidraw.md", FileKind::Diagram)]
    #[case("Drawings/flow.Excalidraw.MD", FileKind::Diagram)]
    #[case("flow.excalidraw", FileKind::Diagram)]
    #[case("papers/paper.PDF", FileKind::Pdf)]
    #[case("img/cover.jpeg", FileKind::Image)]
    #[case("img/logo.svg", FileKind::Image)]
    #[case("archive.zip", FileKind::Other)]
    #[case("README", FileKind::Other)]
    fn test_kind_from_path(#[case] path: &str, #[case] expected: FileKind) {
        assert_eq!(FileKind::from_path(path), expected);
    }

    #[rstest]
    #[case("Drawings/flow.excalidraw.md", "flow")]
    #[case("papers/paper.pdf", "paper")]
    #[case("note.md", "note")]
    #[case("noext", "noext")]
    fn test_basename(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(FileRef::new(path, 0, 0).basename(), expected);
    }
}
