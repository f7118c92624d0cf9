//! Display metadata from frontmatter.

use crate::error::{ErrorKind, Result};
use crate::models::{FileMetadata, Stamp};
use exn::ResultExt;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde_json::Value;
use std::path::Path;
use time::format_description::{OwnedFormatItem, parse_owned};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tome_config::MetadataSettings;
use tome_storage::DocumentStructure;

/// How a frontmatter date property is read.
#[derive(Debug)]
enum DateField {
    NotConfigured,
    Property { key: String, format: Option<OwnedFormatItem> },
}
impl DateField {
    fn new(key: Option<&String>, format: Option<&String>) -> Result<Self> {
        let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
            return Ok(Self::NotConfigured);
        };
        let format = match format.filter(|f| !f.trim().is_empty()) {
            Some(description) => {
                Some(parse_owned::<2>(description).or_raise(|| ErrorKind::InvalidDateFormat(description.clone()))?)
            },
            None => None,
        };
        Ok(Self::Property { key: key.clone(), format })
    }

    fn read(&self, structure: &DocumentStructure) -> Option<Stamp> {
        let Self::Property { key, format } = self else {
            return Some(Stamp::NotConfigured);
        };
        let raw = structure.property_strings(key).into_iter().next()?;
        let parsed = match format {
            Some(format) => parse_with(&raw, format),
            None => parse_default(&raw),
        };
        Some(match parsed {
            Some(ms) => Stamp::Value(ms),
            None => {
                tracing::debug!(property = %key, value = %raw, "unparsable date");
                Stamp::ParseFailed
            },
        })
    }
}

fn millis(datetime: OffsetDateTime) -> i64 {
    (datetime.unix_timestamp_nanos() / 1_000_000) as i64
}

fn parse_with(raw: &str, format: &OwnedFormatItem) -> Option<i64> {
    if let Ok(datetime) = OffsetDateTime::parse(raw, format) {
        return Some(millis(datetime));
    }
    if let Ok(datetime) = PrimitiveDateTime::parse(raw, format) {
        return Some(millis(datetime.assume_utc()));
    }
    Date::parse(raw, format).ok().map(|date| millis(date.midnight().assume_utc()))
}

/// RFC 3339 / ISO 8601 datetimes (a space may stand in for the `T`), plain
/// dates, or a bare number of milliseconds since the epoch.
fn parse_default(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(datetime) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(millis(datetime));
    }
    let iso = raw.replacen(' ', "T", 1);
    if let Ok(datetime) = OffsetDateTime::parse(&iso, &Iso8601::DEFAULT) {
        return Some(millis(datetime));
    }
    if let Ok(datetime) = PrimitiveDateTime::parse(&iso, &Iso8601::DEFAULT) {
        return Some(millis(datetime.assume_utc()));
    }
    if let Ok(date) = Date::parse(raw, &Iso8601::DEFAULT) {
        return Some(millis(date.midnight().assume_utc()));
    }
    raw.parse::<i64>().ok()
}

/// Exclusion rules deciding the `hidden` flag.
#[derive(Debug)]
struct HiddenRules {
    properties: Vec<String>,
    patterns: GlobSet,
}
impl HiddenRules {
    fn new(settings: &MetadataSettings) -> Result<Option<Self>> {
        if !settings.hides_anything() {
            return Ok(None);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &settings.hidden_patterns {
            let glob = GlobBuilder::new(pattern).build().or_raise(|| ErrorKind::InvalidPattern {
                pattern: pattern.clone(),
                reason: "does not compile".to_string(),
            })?;
            builder.add(glob);
        }
        let patterns = builder.build().or_raise(|| ErrorKind::InvalidPattern {
            pattern: settings.hidden_patterns.join(", "),
            reason: "set does not compile".to_string(),
        })?;
        Ok(Some(Self { properties: settings.hidden_properties.clone(), patterns }))
    }

    fn matches(&self, path: &Path, structure: &DocumentStructure) -> bool {
        let by_property = self.properties.iter().any(|key| structure.property(key).is_some_and(truthy));
        // A pattern naming a folder hides everything below it.
        by_property || path.ancestors().filter(|p| !p.as_os_str().is_empty()).any(|p| self.patterns.is_match(p))
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

/// Metadata settings compiled once (date formats parsed, globs built) and
/// applied to any number of documents.
#[derive(Debug)]
pub struct MetadataExtractor {
    name: Option<String>,
    icon: Option<String>,
    color: Option<String>,
    created: DateField,
    modified: DateField,
    hidden: Option<HiddenRules>,
}
impl MetadataExtractor {
    pub fn new(settings: &MetadataSettings) -> Result<Self> {
        Ok(Self {
            name: settings.name_property.clone(),
            icon: settings.icon_property.clone(),
            color: settings.color_property.clone(),
            created: DateField::new(settings.created_property.as_ref(), settings.created_format.as_ref())?,
            modified: DateField::new(settings.modified_property.as_ref(), settings.modified_format.as_ref())?,
            hidden: HiddenRules::new(settings)?,
        })
    }

    /// Whether exclusion rules are active; when they aren't,
    /// [`is_hidden()`](Self::is_hidden) is always `false` and needn't be called.
    pub fn hides_anything(&self) -> bool {
        self.hidden.is_some()
    }

    pub fn is_hidden(&self, path: &Path, structure: &DocumentStructure) -> bool {
        self.hidden.as_ref().is_some_and(|rules| rules.matches(path, structure))
    }

    /// Reads every configured field. `hidden` is computed separately (see
    /// [`is_hidden()`](Self::is_hidden)) so callers can reuse an earlier result.
    pub fn extract(&self, structure: &DocumentStructure, hidden: bool) -> FileMetadata {
        let text = |key: &Option<String>| key.as_ref().and_then(|k| structure.property_strings(k).into_iter().next());
        FileMetadata {
            name: text(&self.name),
            created: self.created.read(structure),
            modified: self.modified.read(structure),
            icon: text(&self.icon),
            color: text(&self.color),
            hidden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const NOTE: &str = "---\ntitle: Roadmap\ncreated: 2024-01-05\nmodified: 05/02/2024\nicon: rocket\ncolor: \"#ff0000\"\nprivate: yes\n---\nbody";

    fn structure() -> DocumentStructure {
        DocumentStructure::parse(NOTE)
    }

    #[test]
    fn test_extract_defaults() {
        let extractor = MetadataExtractor::new(&MetadataSettings::default()).unwrap();
        let metadata = extractor.extract(&structure(), false);
        assert_eq!(metadata.name.as_deref(), Some("Roadmap"));
        assert_eq!(metadata.created, Some(Stamp::Value(1_704_412_800_000)));
        // Not ISO, and no format configured.
        assert_eq!(metadata.modified, Some(Stamp::ParseFailed));
        assert_eq!(metadata.icon.as_deref(), Some("rocket"));
        assert_eq!(metadata.color.as_deref(), Some("#ff0000"));
        assert!(!extractor.hides_anything());
    }

    #[test]
    fn test_custom_format_and_sentinels() {
        let settings = MetadataSettings {
            created_property: None,
            modified_format: Some("[day]/[month]/[year]".to_string()),
            name_property: Some("alias".to_string()),
            ..Default::default()
        };
        let metadata = MetadataExtractor::new(&settings).unwrap().extract(&structure(), false);
        assert_eq!(metadata.created, Some(Stamp::NotConfigured));
        assert_eq!(metadata.modified, Some(Stamp::Value(1_707_091_200_000)));
        // Configured, but the document has no such property.
        assert_eq!(metadata.name, None);
    }

    #[test]
    fn test_absent_date_is_none() {
        let extractor = MetadataExtractor::new(&MetadataSettings::default()).unwrap();
        let metadata = extractor.extract(&DocumentStructure::parse("no frontmatter"), false);
        assert_eq!(metadata.created, None);
        assert_eq!(metadata.modified, None);
    }

    #[test]
    fn test_invalid_format_rejected() {
        let settings = MetadataSettings { created_format: Some("[nonsense".to_string()), ..Default::default() };
        let err = MetadataExtractor::new(&settings).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidDateFormat(_)));
    }

    #[rstest]
    #[case("2024-01-05T10:30:00Z", Some(1_704_450_600_000))]
    #[case("2024-01-05T10:30:00+01:00", Some(1_704_447_000_000))]
    #[case("2024-01-05 10:30", Some(1_704_450_600_000))]
    #[case("2024-01-05", Some(1_704_412_800_000))]
    #[case("1704412800000", Some(1_704_412_800_000))]
    #[case("last tuesday", None)]
    fn test_parse_default(#[case] raw: &str, #[case] expected: Option<i64>) {
        assert_eq!(parse_default(raw), expected);
    }

    #[rstest]
    #[case("Archive/**", "Archive/2023/old.md", true)]
    #[case("Archive", "Archive/2023/old.md", true)]
    #[case("*.canvas", "boards/plan.canvas", true)]
    #[case("Archive/**", "Projects/Plan.md", false)]
    fn test_hidden_patterns(#[case] pattern: &str, #[case] path: &str, #[case] expected: bool) {
        let settings = MetadataSettings { hidden_patterns: vec![pattern.to_string()], ..Default::default() };
        let extractor = MetadataExtractor::new(&settings).unwrap();
        assert!(extractor.hides_anything());
        let structure = DocumentStructure::default();
        assert_eq!(extractor.is_hidden(Path::new(path), &structure), expected);
    }

    #[test]
    fn test_hidden_property() {
        let settings = MetadataSettings { hidden_properties: vec!["private".to_string()], ..Default::default() };
        let extractor = MetadataExtractor::new(&settings).unwrap();
        assert!(extractor.is_hidden(Path::new("note.md"), &structure()));
        assert!(!extractor.is_hidden(Path::new("note.md"), &DocumentStructure::default()));
    }
}
