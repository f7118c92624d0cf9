//! Structural metadata of markdown documents.
//!
//! Only enough markdown is understood to pull out what the indexers need:
//! the YAML frontmatter block, inline `#tags`, embeds (`![[…]]`, `![](…)`)
//! and links. Fenced code blocks and inline code spans are never scanned.

use crate::link::link_target;
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:literal) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

regex!(INLINE_TAG, r"(?:^|[\s(\[,;])#([\p{L}\p{N}_][\p{L}\p{N}_/\-]*)");
regex!(WIKI_LINK, r"(!?)\[\[[^\]\n]+\]\]");
regex!(MARKDOWN_LINK, r"(!?)\[[^\]\n]*\]\([^)\n]+\)");

/// What the indexers need to know about a document besides its raw text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentStructure {
    /// Parsed frontmatter. `None` when the document has no frontmatter block
    /// or the block is not a YAML mapping.
    pub frontmatter: Option<Map<String, Value>>,
    /// Inline tags in document order, without the leading `#`. Not deduplicated.
    pub tags: Vec<String>,
    /// Embed targets in document order (`![[cover.png]]` → `cover.png`).
    pub embeds: Vec<String>,
    /// Non-embed link targets in document order.
    pub links: Vec<String>,
    /// Byte offset at which the body starts (just after the frontmatter).
    pub body_offset: usize,
}
impl DocumentStructure {
    pub fn parse(text: &str) -> Self {
        let (yaml, body_offset) = split_frontmatter(text);
        let mut structure = Self {
            frontmatter: yaml.and_then(parse_frontmatter),
            body_offset,
            ..Self::default()
        };
        structure.scan_body(&text[body_offset..]);
        structure
    }

    fn scan_body(&mut self, body: &str) {
        let mut fence: Option<char> = None;
        for line in body.lines() {
            let trimmed = line.trim_start();
            if let Some(marker) = fence_marker(trimmed) {
                match fence {
                    None => fence = Some(marker),
                    Some(open) if open == marker => fence = None,
                    Some(_) => {},
                }
                continue;
            }
            if fence.is_some() {
                continue;
            }
            let line = strip_inline_code(line);
            if memchr::memchr(b'#', line.as_bytes()).is_some() {
                self.tags.extend(INLINE_TAG.captures_iter(&line).filter_map(|c| {
                    let tag = c.get(1)?.as_str();
                    // Purely numeric tokens are issue numbers, not tags.
                    (!tag.chars().all(|ch| ch.is_ascii_digit())).then(|| tag.to_string())
                }));
            }
            if memchr::memchr(b'[', line.as_bytes()).is_none() {
                continue;
            }
            let mut found: Vec<(usize, bool, &str)> = WIKI_LINK
                .captures_iter(&line)
                .chain(MARKDOWN_LINK.captures_iter(&line))
                .filter_map(|c| {
                    let whole = c.get(0)?;
                    let is_embed = c.get(1).is_some_and(|m| !m.is_empty());
                    Some((whole.start(), is_embed, whole.as_str()))
                })
                .collect();
            found.sort_by_key(|(start, ..)| *start);
            for (_, is_embed, raw) in found {
                let Some(target) = link_target(raw) else { continue };
                match is_embed {
                    true => self.embeds.push(target),
                    false => self.links.push(target),
                }
            }
        }
    }

    /// Looks up a frontmatter property, falling back to a case-insensitive
    /// match of the key.
    pub fn property(&self, key: &str) -> Option<&Value> {
        let frontmatter = self.frontmatter.as_ref()?;
        frontmatter
            .get(key)
            .or_else(|| frontmatter.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v))
    }

    /// A property flattened to strings: scalars become one entry, lists one
    /// entry per scalar element, `null` and missing properties none.
    pub fn property_strings(&self, key: &str) -> Vec<String> {
        match self.property(key) {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
            Some(value) => scalar_string(value).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.property(key).is_some()
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn fence_marker(line: &str) -> Option<char> {
    match line {
        l if l.starts_with("```") => Some('`'),
        l if l.starts_with("~~~") => Some('~'),
        _ => None,
    }
}

/// Replaces inline code spans with spaces so their contents are never
/// mistaken for tags or links.
fn strip_inline_code(line: &str) -> Cow<'_, str> {
    if memchr::memchr(b'`', line.as_bytes()).is_none() {
        return Cow::Borrowed(line);
    }
    let mut out = String::with_capacity(line.len());
    let mut in_code = false;
    for ch in line.chars() {
        match (ch, in_code) {
            ('`', _) => {
                in_code = !in_code;
                out.push(' ');
            },
            (_, true) => out.push(' '),
            (_, false) => out.push(ch),
        }
    }
    Cow::Owned(out)
}

fn parse_frontmatter(yaml: &str) -> Option<Map<String, Value>> {
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Object(map)) => Some(map),
        Ok(Value::Null) => Some(Map::new()),
        Ok(_) => {
            tracing::debug!("frontmatter is not a mapping, ignoring");
            None
        },
        Err(err) => {
            tracing::debug!(error = %err, "could not parse frontmatter");
            None
        },
    }
}

/// Splits a document into its frontmatter YAML (without the `---` fences)
/// and the byte offset at which the body begins.
///
/// ```
/// use tome_storage::structure::split_frontmatter;
/// let text = "---\ntitle: Plan\n---\n# Heading\n";
/// let (yaml, offset) = split_frontmatter(text);
/// assert_eq!(yaml, Some("title: Plan\n"));
/// assert_eq!(&text[offset..], "# Heading\n");
/// assert_eq!(split_frontmatter("no frontmatter"), (None, 0));
/// ```
pub fn split_frontmatter(text: &str) -> (Option<&str>, usize) {
    let rest = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(after_fence) = rest.strip_prefix("---") else {
        return (None, 0);
    };
    let Some(after_newline) = after_fence.strip_prefix("\r\n").or_else(|| after_fence.strip_prefix('\n')) else {
        return (None, 0);
    };
    let yaml_start = text.len() - after_newline.len();
    let mut offset = yaml_start;
    for line in after_newline.split_inclusive('\n') {
        let content = line.trim_end_matches(['\r', '\n']);
        if content == "---" || content == "..." {
            return (Some(&text[yaml_start..offset]), offset + line.len());
        }
        offset += line.len();
    }
    // Unterminated block: treat the whole document as body.
    (None, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const NOTE: &str = "---\ntags: [project, Rust]\ncover: \"[[cover.png]]\"\ncreated: 2024-01-05\n---\n\
        # Heading\n\
        Working on #ToDo and #todo, see [[Plan]] and ![[diagram.excalidraw|300]].\n\
        ```rust\nlet x = \"#not-a-tag ![[nope.png]]\";\n```\n\
        Inline `#code` is ignored, issue #123 too.\n\
        ![photo](img/my%20pic.png) and [site](https://example.com)\n";

    #[test]
    fn test_parse_note() {
        let structure = DocumentStructure::parse(NOTE);
        let frontmatter = structure.frontmatter.as_ref().unwrap();
        assert_eq!(frontmatter.get("cover"), Some(&Value::String("[[cover.png]]".into())));
        assert_eq!(structure.property_strings("tags"), vec!["project", "Rust"]);
        assert_eq!(structure.property_strings("Created"), vec!["2024-01-05"]);
        assert_eq!(structure.tags, vec!["ToDo", "todo"]);
        assert_eq!(structure.embeds, vec!["diagram.excalidraw", "img/my pic.png"]);
        assert_eq!(structure.links, vec!["Plan", "https://example.com"]);
        assert!(NOTE[structure.body_offset..].starts_with("# Heading"));
    }

    #[test]
    fn test_no_frontmatter() {
        let structure = DocumentStructure::parse("Just text with #tag\n");
        assert!(structure.frontmatter.is_none());
        assert_eq!(structure.body_offset, 0);
        assert_eq!(structure.tags, vec!["tag"]);
    }

    #[test]
    fn test_invalid_frontmatter_keeps_body() {
        let structure = DocumentStructure::parse("---\n: [unbalanced\n---\nbody #tag\n");
        assert!(structure.frontmatter.is_none());
        assert_eq!(structure.tags, vec!["tag"]);
    }

    #[rstest]
    #[case("---\n---\nbody", Some(""), "body")]
    #[case("---\r\na: 1\r\n---\r\nbody", Some("a: 1\r\n"), "body")]
    #[case("---\na: 1\n...\nbody", Some("a: 1\n"), "body")]
    #[case("---\na: 1\nbody", None, "---\na: 1\nbody")]
    #[case("----\na: 1\n---\n", None, "----\na: 1\n---\n")]
    #[case("\u{feff}---\na: 1\n---\nbody", Some("a: 1\n"), "body")]
    fn test_split_frontmatter(#[case] text: &str, #[case] yaml: Option<&str>, #[case] body: &str) {
        let (found, offset) = split_frontmatter(text);
        assert_eq!(found, yaml);
        assert_eq!(&text[offset..], body);
    }

    #[test]
    fn test_headings_are_not_tags() {
        let structure = DocumentStructure::parse("# Title\n## Sub #real\n");
        assert_eq!(structure.tags, vec!["real"]);
    }

    #[test]
    fn test_nested_fences() {
        let structure = DocumentStructure::parse("~~~\n```\n#hidden\n~~~\n#shown\n");
        assert_eq!(structure.tags, vec!["shown"]);
    }
}
