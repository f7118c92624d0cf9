//! Plain-text preview snippets.

use crate::consts;
use regex::Captures;
use std::borrow::Cow;
use std::path::Path;
use tome_config::PreviewSettings;
use tome_storage::{DocumentStructure, FileKind};

const ELLIPSIS: char = '…';
/// Frontmatter key written by the diagram plugin into `.excalidraw.md` files.
const DIAGRAM_PROPERTY: &str = "excalidraw-plugin";

/// Diagram documents carry serialized drawing data instead of prose.
pub fn is_diagram(path: &Path, structure: &DocumentStructure) -> bool {
    FileKind::from_path(path) == FileKind::Diagram || structure.has_property(DIAGRAM_PROPERTY)
}

/// Builds the preview of a document: the first preferred property with a
/// value, otherwise the start of the body, stripped of markdown syntax and
/// cut to `settings.max_length` characters. Diagrams always preview as an
/// empty string.
///
/// ```
/// use std::path::Path;
/// use tome_config::PreviewSettings;
/// use tome_extract::preview;
/// use tome_storage::DocumentStructure;
///
/// let text = "# Plan\nShip **v2** with [[Roadmap|the roadmap]].\n";
/// let structure = DocumentStructure::parse(text);
/// let settings = PreviewSettings { skip_headings: true, ..Default::default() };
/// assert_eq!(preview(Path::new("Plan.md"), text, &structure, &settings), "Ship v2 with the roadmap.");
/// ```
pub fn preview(path: &Path, text: &str, structure: &DocumentStructure, settings: &PreviewSettings) -> String {
    if is_diagram(path, structure) {
        return String::new();
    }
    for key in &settings.properties {
        let values = structure.property_strings(key);
        if values.is_empty() {
            continue;
        }
        let cleaned = collapse(&strip_inline(&values.join(" "), settings));
        if !cleaned.is_empty() {
            return truncate(&cleaned, settings.max_length);
        }
    }
    let body = text.get(structure.body_offset..).unwrap_or_default();
    truncate(&body_text(body, settings), settings.max_length)
}

fn body_text(body: &str, settings: &PreviewSettings) -> String {
    let body = consts::HIDDEN_COMMENT.replace_all(body, " ");
    let body = match settings.skip_html {
        true => consts::HTML_COMMENT.replace_all(&body, " "),
        false => body,
    };
    // Enough text to fill the preview and see that it overflows.
    let budget = settings.max_length + 1;
    let mut out = String::new();
    let mut collected = 0;
    let mut fence: Option<char> = None;
    for line in body.lines() {
        let trimmed = line.trim_start();
        let marker = match trimmed {
            l if l.starts_with("```") => Some('`'),
            l if l.starts_with("~~~") => Some('~'),
            _ => None,
        };
        if let Some(marker) = marker {
            match fence {
                None => fence = Some(marker),
                Some(open) if open == marker => fence = None,
                Some(_) => {},
            }
            continue;
        }
        if fence.is_some() && settings.skip_code_blocks {
            continue;
        }
        let Some(line) = clean_line(line, fence.is_some(), settings) else { continue };
        collected += line.chars().count() + 1;
        out.push_str(&line);
        out.push(' ');
        if collected > budget {
            break;
        }
    }
    collapse(&out)
}

/// One body line as plain text, or `None` when the whole line is dropped.
fn clean_line(line: &str, in_code: bool, settings: &PreviewSettings) -> Option<String> {
    if in_code {
        return Some(line.trim().to_string());
    }
    if consts::HORIZONTAL_RULE.is_match(line) || consts::TABLE_DIVIDER.is_match(line) {
        return None;
    }
    let line: Cow<'_, str> = match consts::HEADING.find(line) {
        Some(_) if settings.skip_headings => return None,
        Some(heading) => Cow::Borrowed(&line[heading.end()..]),
        None => Cow::Borrowed(line),
    };
    let line = consts::QUOTE.replace(&line, "").into_owned();
    let line = consts::CALLOUT.replace(&line, "").into_owned();
    let line = consts::LIST_MARKER.replace(&line, "").into_owned();
    let line = strip_inline(&line, settings);
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_string())
}

fn first_group(captures: &Captures) -> String {
    captures.iter().skip(1).flatten().next().map(|m| m.as_str().to_string()).unwrap_or_default()
}

fn strip_inline(text: &str, settings: &PreviewSettings) -> String {
    let text = consts::EMBED.replace_all(text, " ");
    let text = consts::WIKI_LINK.replace_all(&text, |c: &Captures| match c.get(2) {
        Some(alias) => alias.as_str().to_string(),
        None => c.get(1).map(|t| t.as_str().replace('#', " ")).unwrap_or_default(),
    });
    let text = consts::MARKDOWN_LINK.replace_all(&text, "$1");
    let text = consts::FOOTNOTE_REF.replace_all(&text, "");
    let text = match settings.skip_html {
        true => consts::HTML_TAG.replace_all(&text, " "),
        false => text,
    };
    let text = consts::INLINE_CODE.replace_all(&text, "$1");
    let text = consts::STRONG.replace_all(&text, first_group);
    let text = consts::EMPHASIS.replace_all(&text, first_group);
    let text = consts::STRIKE_HIGHLIGHT.replace_all(&text, first_group);
    let text = consts::BLOCK_ID.replace(&text, "");
    text.replace('|', " ")
}

fn collapse(text: &str) -> String {
    consts::WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Cuts `text` to at most `max` characters, ending with an ellipsis when
/// anything was dropped.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    let mut kept = kept.trim_end().to_string();
    kept.push(ELLIPSIS);
    kept
}
