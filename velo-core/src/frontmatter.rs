//! Front matter detection, synthesis, and tolerant decoding.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Line that opens and closes a front matter block
pub const DELIMITER: &str = "---";

#[derive(Error, Debug)]
pub enum FrontmatterError {
    #[error("Invalid YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Front matter is not a key/value mapping")]
    NotAMapping,
}

/// Metadata declared at the top of a post. Every field is optional; values of
/// the wrong shape decode to `None` instead of failing the whole block.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Frontmatter {
    #[serde(deserialize_with = "coerce::scalar")]
    pub title: Option<String>,

    #[serde(deserialize_with = "coerce::scalar")]
    pub date: Option<String>,

    #[serde(deserialize_with = "coerce::scalar")]
    pub author: Option<String>,

    #[serde(deserialize_with = "coerce::string_list")]
    pub tags: Option<Vec<String>>,

    #[serde(deserialize_with = "coerce::string_list")]
    pub categories: Option<Vec<String>>,

    /// Single `/`-delimited category path
    #[serde(deserialize_with = "coerce::scalar")]
    pub category: Option<String>,

    #[serde(deserialize_with = "coerce::scalar")]
    pub slug: Option<String>,

    #[serde(deserialize_with = "coerce::flag")]
    pub draft: Option<bool>,
}

impl Frontmatter {
    /// Decode a YAML block. Keys are matched case-insensitively.
    ///
    /// ```
    /// use velo_core::frontmatter::Frontmatter;
    ///
    /// let fm = Frontmatter::parse("Title: Hello\ntags: rust, web\ndraft: \"false\"").unwrap();
    /// assert_eq!(fm.title.as_deref(), Some("Hello"));
    /// assert_eq!(fm.tags, Some(vec!["rust".to_string(), "web".to_string()]));
    /// assert_eq!(fm.draft, Some(false));
    /// ```
    pub fn parse(yaml: &str) -> Result<Self, FrontmatterError> {
        let mapping = match serde_yaml::from_str::<Value>(yaml)? {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(mapping) => mapping,
            _ => return Err(FrontmatterError::NotAMapping),
        };

        let normalized: Mapping = mapping
            .into_iter()
            .filter_map(|(key, value)| {
                key.as_str()
                    .map(|k| (Value::String(k.trim().to_lowercase()), value))
            })
            .collect();

        Ok(serde_yaml::from_value(Value::Mapping(normalized))?)
    }

    /// Categories declared in YAML: `categories` wins over `category`.
    ///
    /// Returns `None` when neither key is present.
    pub fn declared_categories(&self) -> Option<Vec<String>> {
        if let Some(categories) = &self.categories {
            return Some(categories.clone());
        }
        self.category.as_ref().map(|path| {
            path.split('/')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    /// Parsed `date`, if present and in a recognised format
    pub fn published(&self) -> Option<NaiveDateTime> {
        self.date.as_deref().and_then(parse_date)
    }
}

/// Split `content` into `(yaml, body)`.
///
/// Front matter is present only when the content (ignoring leading
/// whitespace) opens with a delimiter line and a later line is the same
/// delimiter. The body has its leading whitespace removed.
pub fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let trimmed = content.trim_start();
    let mut lines = trimmed.split_inclusive('\n');

    let first = lines.next()?;
    if first.trim_end() != DELIMITER {
        return None;
    }

    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        if line.trim_end() == DELIMITER {
            let yaml = &trimmed[yaml_start..offset];
            let body = trimmed[offset + line.len()..].trim_start();
            return Some((yaml, body));
        }
        offset += line.len();
    }

    None
}

/// Whether `content` carries a front matter block
pub fn has_front_matter(content: &str) -> bool {
    split_front_matter(content).is_some()
}

/// Build the block prepended to files that have no front matter.
pub fn default_front_matter(
    title: &str,
    now: NaiveDateTime,
    categories: &[String],
    slug: &str,
) -> String {
    let categories = categories
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "{delim}\ntitle: {title}\ndate: {date}\nauthor: \"\"\ntags: []\ncategories: [{categories}]\nslug: {slug}\ndraft: false\n{delim}\n\n",
        delim = DELIMITER,
        title = quote(title),
        date = now.format("%Y-%m-%d"),
        categories = categories,
        slug = quote(slug),
    )
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Parse a front matter date leniently.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]`, `YYYY-MM-DD`, and `YYYY/MM/DD`.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Shared coercions used by [`Frontmatter`]'s fields.
mod coerce {
    use serde::{Deserialize, Deserializer};
    use serde_yaml::Value;

    fn to_string(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Tagged(tagged) => to_string(&tagged.value),
            _ => None,
        }
    }

    pub fn scalar<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(to_string(&Value::deserialize(d)?))
    }

    /// A sequence, or a comma-separated string
    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
        let list: Vec<String> = match Value::deserialize(d)? {
            Value::Null => return Ok(None),
            Value::Sequence(items) => items.iter().filter_map(to_string).collect(),
            Value::String(s) => s.split(',').map(|part| part.trim().to_string()).collect(),
            other => to_string(&other).into_iter().collect(),
        };
        Ok(Some(list.into_iter().filter(|s| !s.is_empty()).collect()))
    }

    /// A boolean, or a string spelling one; anything else is `None`
    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Bool(b) => Some(b),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_split_valid_front_matter() {
        let content = "---\ntitle: Test Post\n---\n\n# Hello World\n";
        let (yaml, body) = split_front_matter(content).unwrap();
        assert_eq!(yaml, "title: Test Post\n");
        assert_eq!(body, "# Hello World\n");
    }

    #[test]
    fn test_split_ignores_leading_whitespace() {
        let content = "\n\n  ---\ntitle: X\n---\nBody";
        let (yaml, body) = split_front_matter(content).unwrap();
        assert_eq!(yaml.trim(), "title: X");
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_split_requires_closing_delimiter() {
        assert!(split_front_matter("---\ntitle: X\nBody").is_none());
        assert!(!has_front_matter("# Just Content\n\nNo front matter here."));
        assert!(!has_front_matter(""));
    }

    #[test]
    fn test_split_crlf() {
        let (yaml, body) = split_front_matter("---\r\ntitle: X\r\n---\r\nBody").unwrap();
        assert_eq!(yaml, "title: X\r\n");
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_parse_all_fields() {
        let fm = Frontmatter::parse(
            r#"
title: Test Post
date: 2025-01-01
author: Leo
tags:
  - rust
  - programming
categories: [tech, rust]
slug: test-post
draft: true
"#,
        )
        .unwrap();

        assert_eq!(fm.title.as_deref(), Some("Test Post"));
        assert_eq!(fm.date.as_deref(), Some("2025-01-01"));
        assert_eq!(fm.author.as_deref(), Some("Leo"));
        assert_eq!(fm.tags, Some(vec!["rust".into(), "programming".into()]));
        assert_eq!(fm.categories, Some(vec!["tech".into(), "rust".into()]));
        assert_eq!(fm.slug.as_deref(), Some("test-post"));
        assert_eq!(fm.draft, Some(true));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let fm = Frontmatter::parse("TITLE: Loud\nDraft: false\nTags: [a]").unwrap();
        assert_eq!(fm.title.as_deref(), Some("Loud"));
        assert_eq!(fm.draft, Some(false));
        assert_eq!(fm.tags, Some(vec!["a".into()]));
    }

    #[test]
    fn test_tags_from_comma_string() {
        let fm = Frontmatter::parse("tags: \"rust,  web , ,cli\"").unwrap();
        assert_eq!(fm.tags, Some(vec!["rust".into(), "web".into(), "cli".into()]));
    }

    #[test]
    fn test_scalar_coercion() {
        let fm = Frontmatter::parse("title: 2024\nslug: 42").unwrap();
        assert_eq!(fm.title.as_deref(), Some("2024"));
        assert_eq!(fm.slug.as_deref(), Some("42"));
    }

    #[test]
    fn test_unparseable_draft_is_none() {
        let fm = Frontmatter::parse("draft: maybe").unwrap();
        assert_eq!(fm.draft, None);
        let fm = Frontmatter::parse("draft: \"TRUE\"").unwrap();
        assert_eq!(fm.draft, Some(true));
    }

    #[test]
    fn test_declared_categories() {
        let fm = Frontmatter::parse("category: \"tech / rust /\"").unwrap();
        assert_eq!(
            fm.declared_categories(),
            Some(vec!["tech".to_string(), "rust".to_string()])
        );

        let fm = Frontmatter::parse("categories: [a]\ncategory: b/c").unwrap();
        assert_eq!(fm.declared_categories(), Some(vec!["a".to_string()]));

        let fm = Frontmatter::parse("title: none").unwrap();
        assert_eq!(fm.declared_categories(), None);
    }

    #[test]
    fn test_empty_block() {
        assert_eq!(Frontmatter::parse("").unwrap(), Frontmatter::default());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Frontmatter::parse("title: Test\ninvalid yaml: [unclosed").is_err());
        assert!(matches!(
            Frontmatter::parse("- just\n- a list"),
            Err(FrontmatterError::NotAMapping)
        ));
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(
            parse_date("2024-05-06").unwrap().date(),
            NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
        );
        assert_eq!(
            parse_date("2024/05/06").unwrap().date(),
            NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
        );
        assert_eq!(parse_date("2024-05-06 13:45").unwrap().hour(), 13);
        assert!(parse_date("2024-05-06T10:00:00+00:00").is_some());
        assert!(parse_date("someday").is_none());
    }

    #[test]
    fn test_default_front_matter_round_trips() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let block = default_front_matter(
            "My \"quoted\" note",
            now,
            &["tech".to_string(), "rust".to_string()],
            "my-quoted-note",
        );
        let content = format!("{}Body", block);

        let (yaml, body) = split_front_matter(&content).unwrap();
        assert_eq!(body, "Body");

        let fm = Frontmatter::parse(yaml).unwrap();
        assert_eq!(fm.title.as_deref(), Some("My \"quoted\" note"));
        assert_eq!(fm.date.as_deref(), Some("2024-03-09"));
        assert_eq!(fm.categories, Some(vec!["tech".into(), "rust".into()]));
        assert_eq!(fm.tags, Some(vec![]));
        assert_eq!(fm.slug.as_deref(), Some("my-quoted-note"));
        assert_eq!(fm.draft, Some(false));
    }
}
