//! Link and embed reference handling.
//!
//! Notes refer to other files using wiki links (`[[cover.png]]`,
//! `![[Drawing.excalidraw|300]]`) or markdown links (`![alt](img/a%20b.png)`).
//! Frontmatter properties usually carry the same syntax as a plain string.

use crate::path::validate;
use std::path::{Path, PathBuf};

/// Extracts the target of a link reference, dropping wiki/markdown syntax,
/// aliases (`|…`), heading or block anchors (`#…`), and percent-encoded
/// spaces. Returns `None` for empty references.
///
/// ```
/// use tome_storage::link_target;
/// assert_eq!(link_target("![[cover.png|200]]").as_deref(), Some("cover.png"));
/// assert_eq!(link_target("[[Notes/Plan#Goals]]").as_deref(), Some("Notes/Plan"));
/// assert_eq!(link_target("![alt](img/my%20pic.png)").as_deref(), Some("img/my pic.png"));
/// assert_eq!(link_target("  attachments/a.pdf ").as_deref(), Some("attachments/a.pdf"));
/// assert_eq!(link_target("[[]]"), None);
/// ```
pub fn link_target(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('!').unwrap_or(raw);
    let inner = if let Some(wiki) = raw.strip_prefix("[[").and_then(|r| r.strip_suffix("]]")) {
        wiki
    } else if raw.starts_with('[') && raw.ends_with(')') {
        // Markdown link: [alt](target "title")
        let open = raw.rfind("](")?;
        let target = &raw[open + 2..raw.len() - 1];
        let target = target.trim();
        let target = match target.strip_prefix('<') {
            Some(t) => t.split('>').next().unwrap_or(t),
            None => target.split_whitespace().next().unwrap_or(target),
        };
        return non_empty(&target.replace("%20", " "));
    } else {
        raw
    };
    let inner = inner.split('|').next().unwrap_or(inner);
    let inner = inner.split('#').next().unwrap_or(inner);
    non_empty(inner.trim())
}

fn non_empty(s: &str) -> Option<String> {
    match s.is_empty() {
        true => None,
        false => Some(s.to_string()),
    }
}

/// Whether a reference points outside the vault.
pub fn is_external(target: &str) -> bool {
    let lower = target.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolves a link target against a set of candidate vault paths, in the
/// order a note-taking app would:
///
/// 1. relative to the folder of the `source` document,
/// 2. relative to the vault root,
/// 3. by trailing path components anywhere in the vault, preferring the
///    candidate closest to the source and then the shortest path.
///
/// A target also matches the markdown note of the same name with `.md`
/// appended (`Plan` → `Plan.md`, `flow.excalidraw` → `flow.excalidraw.md`).
pub fn resolve_among<'a>(
    target: &str,
    source: &Path,
    candidates: impl IntoIterator<Item = &'a Path>,
) -> Option<PathBuf> {
    if is_external(target) {
        return None;
    }
    let target = target.trim().trim_start_matches('/');
    if target.is_empty() {
        return None;
    }
    let wanted = Path::new(target);
    let with_md = wanted.extension().is_none_or(|e| e != "md").then(|| PathBuf::from(format!("{target}.md")));
    let source_dir = source.parent().unwrap_or(Path::new(""));
    let relative = validate(source_dir.join(wanted)).ok();
    let relative_md = with_md.as_ref().and_then(|md| validate(source_dir.join(md)).ok());
    let absolute = validate(wanted).ok();
    let absolute_md = with_md.as_ref().and_then(|md| validate(md).ok());

    let mut exact: [Option<&'a Path>; 4] = [None; 4];
    let mut suffix: Vec<&'a Path> = Vec::new();
    for candidate in candidates {
        let matches = [&relative, &relative_md, &absolute, &absolute_md];
        for (slot, expected) in matches.iter().enumerate() {
            if expected.as_deref() == Some(candidate) {
                exact[slot] = Some(candidate);
            }
        }
        if candidate.ends_with(wanted) || with_md.as_ref().is_some_and(|md| candidate.ends_with(md)) {
            suffix.push(candidate);
        }
    }
    if let Some(found) = exact.into_iter().flatten().next() {
        return Some(found.to_path_buf());
    }
    suffix.sort_by_key(|candidate| {
        let same_folder = candidate.parent() != Some(source_dir);
        (same_folder, candidate.components().count(), candidate.to_path_buf())
    });
    suffix.first().map(|p| p.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn vault() -> Vec<PathBuf> {
        [
            "cover.png",
            "Projects/cover.png",
            "Projects/Plan.md",
            "Archive/Deep/Plan.md",
            "Drawings/flow.excalidraw.md",
            "papers/paper.pdf",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect()
    }

    #[rstest]
    #[case("cover.png", "Projects/Note.md", Some("Projects/cover.png"))]
    #[case("cover.png", "Inbox.md", Some("cover.png"))]
    #[case("Plan", "Inbox.md", Some("Projects/Plan.md"))]
    #[case("Deep/Plan", "Inbox.md", Some("Archive/Deep/Plan.md"))]
    #[case("flow.excalidraw", "Inbox.md", Some("Drawings/flow.excalidraw.md"))]
    #[case("/papers/paper.pdf", "Projects/Plan.md", Some("papers/paper.pdf"))]
    #[case("missing.png", "Inbox.md", None)]
    #[case("https://example.com/a.png", "Inbox.md", None)]
    fn test_resolve(#[case] target: &str, #[case] source: &str, #[case] expected: Option<&str>) {
        let vault = vault();
        let resolved = resolve_among(target, Path::new(source), vault.iter().map(PathBuf::as_path));
        assert_eq!(resolved.as_deref(), expected.map(Path::new));
    }

    #[rstest]
    #[case("[[a.png]]", Some("a.png"))]
    #[case("![[Sub/a.png|alias]]", Some("Sub/a.png"))]
    #[case("[x](<img/with space.png>)", Some("img/with space.png"))]
    #[case("![x](img/a.png \"title\")", Some("img/a.png"))]
    #[case("", None)]
    fn test_link_target(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(link_target(raw).as_deref(), expected);
    }
}
