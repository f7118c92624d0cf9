//! Tag collection from frontmatter and body.

use crate::models::TagSet;
use crate::models::tags::TagList;
use std::iter::once;
use tome_config::TagSettings;
use tome_storage::DocumentStructure;

const TAGS_PROPERTY: &str = "tags";

/// Property values may be a YAML list or a single string of comma or
/// space separated tags.
fn split_values(structure: &DocumentStructure, key: &str) -> Vec<String> {
    structure
        .property_strings(key)
        .iter()
        .flat_map(|value| value.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// All tags of a document: the `tags` property, then the configured
/// alternate properties, then inline tags, deduplicated case-insensitively
/// (first spelling wins). Each configured tag property also gets its own
/// list in [`TagSet::properties`].
///
/// ```
/// use tome_config::TagSettings;
/// use tome_extract::extract_tags;
/// use tome_storage::DocumentStructure;
///
/// let structure = DocumentStructure::parse("#ToDo then #todo and #Later");
/// let tags = extract_tags(&structure, &TagSettings::default());
/// assert_eq!(tags.tags, vec!["ToDo", "Later"]);
/// ```
pub fn extract_tags(structure: &DocumentStructure, settings: &TagSettings) -> TagSet {
    let mut flat = TagList::default();
    let keys = once(TAGS_PROPERTY).chain(settings.alternate_properties.iter().map(String::as_str));
    for key in keys {
        for tag in split_values(structure, key) {
            flat.push(&tag);
        }
    }
    for tag in &structure.tags {
        flat.push(tag);
    }
    let properties = settings
        .tag_properties
        .iter()
        .filter_map(|key| {
            let mut list = TagList::default();
            for tag in split_values(structure, key) {
                list.push(&tag);
            }
            let tags = list.into_vec();
            (!tags.is_empty()).then(|| (key.clone(), tags))
        })
        .collect();
    TagSet { tags: flat.into_vec(), properties }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE: &str = "---\ntags: [Project, \"#rust\"]\ntopics: \"Async, tokio\"\nstatus: [Draft, draft, Review]\n---\nWorking on #project and #Backlog.\n";

    #[test]
    fn test_sources_and_order() {
        let structure = DocumentStructure::parse(NOTE);
        let settings = TagSettings {
            alternate_properties: vec!["topics".to_string()],
            ..Default::default()
        };
        let tags = extract_tags(&structure, &settings);
        assert_eq!(tags.tags, vec!["Project", "rust", "Async", "tokio", "Backlog"]);
        assert!(tags.properties.is_empty());
    }

    #[test]
    fn test_named_properties() {
        let structure = DocumentStructure::parse(NOTE);
        let settings = TagSettings {
            tag_properties: vec!["status".to_string(), "missing".to_string()],
            ..Default::default()
        };
        let tags = extract_tags(&structure, &settings);
        assert_eq!(tags.properties.get("status"), Some(&vec!["Draft".to_string(), "Review".to_string()]));
        assert!(!tags.properties.contains_key("missing"));
        // Named properties are kept apart from the flat list.
        assert!(!tags.contains("Review"));
    }

    #[test]
    fn test_no_tags() {
        let structure = DocumentStructure::parse("plain text");
        assert!(extract_tags(&structure, &TagSettings::default()).is_empty());
    }
}
