use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Block-level markers, matched against a single line.
regex!(HEADING, r"^\s{0,3}#{1,6}(?:\s+|$)");
regex!(HORIZONTAL_RULE, r"^\s{0,3}(?:-{3,}|\*{3,}|_{3,})\s*$");
regex!(TABLE_DIVIDER, r"^\s*\|?(?:\s*:?-+:?\s*\|)+\s*(?::?-+:?)?\s*$");
regex!(QUOTE, r"^\s*(?:>\s?)+");
regex!(CALLOUT, r"^\[![^\]]*\][+-]?\s*");
regex!(LIST_MARKER, r"^\s*(?:[-*+]|\d+[.)])\s+(?:\[.\]\s+)?");
regex!(BLOCK_ID, r"\s\^[A-Za-z0-9-]+\s*$");

// Inline syntax.
regex!(EMBED, r"!\[\[[^\]\n]*\]\]|!\[[^\]\n]*\]\([^)\n]*\)");
regex!(WIKI_LINK, r"\[\[([^\]|\n]*)(?:\|([^\]\n]*))?\]\]");
regex!(MARKDOWN_LINK, r"\[([^\]\n]*)\]\([^)\n]*\)");
regex!(FOOTNOTE_REF, r"\[\^[^\]\n]+\]");
regex!(HTML_COMMENT, r"(?s)<!--.*?-->");
regex!(HTML_TAG, r"</?[A-Za-z][^>\n]*>");
regex!(HIDDEN_COMMENT, r"(?s)%%.*?%%");
regex!(INLINE_CODE, r"`([^`\n]*)`");
regex!(STRONG, r"\*\*([^*\n]+)\*\*|__([^_\n]+)__");
regex!(EMPHASIS, r"\*([^*\n]+)\*|\b_([^_\n]+)_\b");
regex!(STRIKE_HIGHLIGHT, r"~~([^~\n]+)~~|==([^=\n]+)==");
regex!(WHITESPACE, r"\s+");
