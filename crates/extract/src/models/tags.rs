use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Tags of a file: the flat list plus one list per named tag property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Vec<String>>,
}
impl TagSet {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.properties.values().all(Vec::is_empty)
    }

    /// Case-insensitive membership test on the flat list.
    pub fn contains(&self, tag: &str) -> bool {
        let wanted = super::fold(tag);
        self.tags.iter().any(|t| super::fold(t) == wanted)
    }
}

/// Accumulates tags in first-seen order, stripping the leading `#` and
/// ignoring later spellings of a tag already seen.
#[derive(Debug, Default)]
pub(crate) struct TagList {
    seen: HashSet<String>,
    tags: Vec<String>,
}
impl TagList {
    pub(crate) fn push(&mut self, raw: &str) {
        let tag = raw.trim().trim_start_matches('#').trim();
        if tag.is_empty() {
            return;
        }
        if self.seen.insert(super::fold(tag)) {
            self.tags.push(tag.to_string());
        }
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_casing_wins() {
        let mut list = TagList::default();
        for raw in ["#ToDo", "todo", "#TODO", "  ", "#", "project/alpha"] {
            list.push(raw);
        }
        assert_eq!(list.into_vec(), vec!["ToDo", "project/alpha"]);
    }

    #[test]
    fn test_empty_set() {
        let mut set = TagSet::default();
        assert!(set.is_empty());
        set.properties.insert("status".to_string(), Vec::new());
        assert!(set.is_empty());
        set.tags.push("Rust".to_string());
        assert!(set.contains("#rust"));
    }
}
