//! Tag maps and tag-level helpers shared by every entity kind.

use std::collections::BTreeMap;

/// Free-form OSM key/value tags.
pub type Tags = BTreeMap<String, String>;

/// Maximum length, in characters, of a merged tag value.
pub const MAX_TAG_VALUE_CHARS: usize = 255;

/// A tag value as seen across a multi-entity selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    /// Every entity carries the same value.
    Single(String),
    /// Entities disagree. `None` marks entities lacking the key and sorts last.
    Multiple(Vec<Option<String>>),
}

/// Combined view of the tags of several entities.
pub type CombinedTags = BTreeMap<String, TagValue>;

/// Build the combined tag view used when editing several entities at once.
///
/// # Examples
/// ```
/// use osm_edit_core::tags::{Tags, TagValue, combined_tags};
///
/// let a = Tags::from([("highway".into(), "primary".into())]);
/// let b = Tags::from([("highway".into(), "primary".into()), ("name".into(), "Elm".into())]);
/// let combined = combined_tags(&[&a, &b]);
/// assert_eq!(combined["highway"], TagValue::Single("primary".into()));
/// assert_eq!(combined["name"], TagValue::Multiple(vec![Some("Elm".into()), None]));
/// ```
#[must_use]
pub fn combined_tags(all: &[&Tags]) -> CombinedTags {
    let mut values: BTreeMap<&str, Vec<Option<&str>>> = BTreeMap::new();
    for tags in all {
        for key in tags.keys().filter(|k| !k.is_empty()) {
            values.entry(key.as_str()).or_default();
        }
    }
    for (key, seen) in &mut values {
        for tags in all {
            let value = tags.get(*key).map(String::as_str);
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
    }
    values
        .into_iter()
        .map(|(key, mut seen)| {
            let value = match seen.as_slice() {
                [Some(only)] => TagValue::Single((*only).to_owned()),
                _ => {
                    seen.sort_by(|a, b| match (a, b) {
                        (Some(x), Some(y)) => x.cmp(y),
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => std::cmp::Ordering::Equal,
                    });
                    TagValue::Multiple(seen.into_iter().map(|v| v.map(str::to_owned)).collect())
                }
            };
            (key.to_owned(), value)
        })
        .collect()
}

/// True for keys carrying feature semantics, as opposed to bookkeeping.
#[must_use]
pub fn is_interesting_key(key: &str) -> bool {
    key != "attribution"
        && key != "created_by"
        && key != "source"
        && key != "odbl"
        && !key.starts_with("source:")
        && !key.starts_with("source_ref")
        && !key.starts_with("tiger:")
}

/// True if any key is interesting.
#[must_use]
pub fn has_interesting_tags(tags: &Tags) -> bool {
    tags.keys().any(|k| is_interesting_key(k))
}

/// True if any key other than `area` is present.
#[must_use]
pub fn has_non_geometry_tags(tags: &Tags) -> bool {
    tags.keys().any(|k| k != "area")
}

/// Union two `;`-separated value lists, truncated to [`MAX_TAG_VALUE_CHARS`].
#[must_use]
pub fn merge_tag_values(existing: &str, incoming: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in split_values(existing).chain(split_values(incoming)) {
        if !parts.contains(&part) {
            parts.push(part);
        }
    }
    parts.join(";").chars().take(MAX_TAG_VALUE_CHARS).collect()
}

fn split_values(value: &str) -> impl Iterator<Item = &str> {
    value.split(';').enumerate().map(|(i, part)| {
        if i == 0 { part } else { part.trim_start() }
    })
}

/// Merge `incoming` into `existing`, returning `None` when nothing changes.
///
/// Missing or empty values are filled in; differing values become a `;`
/// union of both.
#[must_use]
pub fn merge_tags(existing: &Tags, incoming: &Tags) -> Option<Tags> {
    let mut merged = existing.clone();
    let mut changed = false;
    for (key, value) in incoming {
        match merged.get(key) {
            Some(current) if !current.is_empty() => {
                if current != value {
                    let union = merge_tag_values(current, value);
                    merged.insert(key.clone(), union);
                    changed = true;
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
                changed = true;
            }
        }
    }
    changed.then_some(merged)
}

/// Build a tag map from string pairs.
#[must_use]
pub fn tags_from<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Tags {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a", "b", "a;b")]
    #[case("a;b", "b; c", "a;b;c")]
    #[case("x", "x", "x")]
    fn merge_tag_values_deduplicates(#[case] a: &str, #[case] b: &str, #[case] expected: &str) {
        assert_eq!(merge_tag_values(a, b), expected);
    }

    #[rstest]
    fn merge_tag_values_truncates_long_lists() {
        let a = "a".repeat(200);
        let b = "b".repeat(200);
        assert_eq!(merge_tag_values(&a, &b).chars().count(), MAX_TAG_VALUE_CHARS);
    }

    #[rstest]
    fn merge_tags_reports_no_change() {
        let a = tags_from([("a", "a")]);
        assert!(merge_tags(&a, &tags_from([("a", "a")])).is_none());
    }

    #[rstest]
    fn merge_tags_unions_conflicts_and_adds_missing() {
        let a = tags_from([("a", "a"), ("b", "b")]);
        let b = tags_from([("a", "x"), ("c", "c")]);
        let merged = merge_tags(&a, &b);
        assert_eq!(
            merged,
            Some(tags_from([("a", "a;x"), ("b", "b"), ("c", "c")]))
        );
    }

    #[rstest]
    #[case("highway", true)]
    #[case("source", false)]
    #[case("source:date", false)]
    #[case("tiger:cfcc", false)]
    #[case("created_by", false)]
    fn interesting_keys(#[case] key: &str, #[case] expected: bool) {
        assert_eq!(is_interesting_key(key), expected);
    }

    #[rstest]
    fn combined_tags_marks_disagreement() {
        let a = tags_from([("k", "1")]);
        let b = tags_from([("k", "2")]);
        let combined = combined_tags(&[&a, &b]);
        assert_eq!(
            combined.get("k"),
            Some(&TagValue::Multiple(vec![Some("1".into()), Some("2".into())]))
        );
    }
}
