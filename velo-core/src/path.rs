//! Path and identifier normalization: filesystem-safe names, stable short
//! hash codes, and URL slugs.

use chrono::{Local, NaiveDateTime};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Characters that [`sanitize`] replaces with `-`.
///
/// This is the strict set: everything that breaks a path on some platform plus
/// common punctuation, so sanitized names are also safe inside URLs.
pub const ILLEGAL_CHARS: &[char] = &[
    ' ', '\u{3000}', '/', '\\', ':', '*', '?', '"', '<', '>', '|', '.', ',', ';', '!', '@', '#',
    '$', '%', '^', '&', '(', ')', '+', '=', '[', ']', '{', '}', '~', '`',
];

/// Hash code returned for empty input.
pub const EMPTY_HASH: &str = "00000000";

/// Replace every character in [`ILLEGAL_CHARS`] with `-`.
///
/// ```
/// use velo_core::path::sanitize;
///
/// assert_eq!(sanitize("my notes/v1.2"), "my-notes-v1-2");
/// ```
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) { '-' } else { c })
        .collect()
}

/// Eight lowercase hex characters derived from the content of `input`.
///
/// The value only depends on the input bytes, so it is identical across
/// processes and machines.
pub fn hash_code(input: &str) -> String {
    if input.is_empty() {
        return EMPTY_HASH.to_string();
    }

    let digest = Sha256::digest(input.as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Flat output file name for a post.
///
/// `key` is the post's source path relative to the content root (always
/// `/`-separated), or a synthetic key for posts without a source file.
pub fn post_file_name(key: &str, slug: &str) -> String {
    format!("{}-{}.html", hash_code(key), sanitize(slug))
}

static TRANSLITERATIONS: OnceLock<Vec<(String, String)>> = OnceLock::new();

/// The embedded phrase table, longest key first.
fn transliterations() -> &'static [(String, String)] {
    TRANSLITERATIONS.get_or_init(|| {
        let table: BTreeMap<String, String> =
            match serde_yaml::from_str(include_str!("../assets/transliteration.yml")) {
                Ok(table) => table,
                Err(err) => {
                    tracing::error!("Invalid transliteration table: {}", err);
                    BTreeMap::new()
                }
            };

        let mut entries: Vec<(String, String)> = table.into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        entries
    })
}

/// Replace known phrases with their ASCII token.
///
/// Each token is padded with spaces so that adjacent phrases end up as
/// separate words in the slug.
pub fn transliterate(input: &str) -> String {
    let mut result = input.to_string();
    for (phrase, token) in transliterations() {
        if result.contains(phrase.as_str()) {
            result = result.replace(phrase.as_str(), &format!(" {} ", token));
        }
    }
    result
}

fn non_slug_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9\s-]").unwrap())
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn hyphens_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-+").unwrap())
}

/// Convert a title to a URL-safe slug, using the current local time for the
/// fallback form.
///
/// ```
/// use velo_core::slugify;
///
/// assert_eq!(slugify("Hello World"), "hello-world");
/// assert_eq!(slugify("Rust & Safety"), "rust-safety");
/// assert_eq!(slugify("技術文章"), "tech-article");
/// ```
pub fn slugify(title: &str) -> String {
    slugify_at(title, Local::now().naive_local())
}

/// Convert a title to a URL-safe slug.
///
/// Rules, in order:
/// - known phrases are transliterated (longest first)
/// - remaining text is folded to ASCII and lowercased
/// - anything outside `[a-z0-9\s-]` is dropped
/// - whitespace runs become a single `-`, repeated `-` collapse, and the
///   result is trimmed of `-`
///
/// When fewer than three characters survive, the slug is
/// `post-YYYYMMDD-xxxx` where `xxxx` is derived from the title and `now`.
pub fn slugify_at(title: &str, now: NaiveDateTime) -> String {
    let folded = deunicode::deunicode(&transliterate(title)).to_lowercase();
    let filtered = non_slug_regex().replace_all(&folded, "");
    let hyphenated = whitespace_regex().replace_all(filtered.trim(), "-");
    let collapsed = hyphens_regex().replace_all(&hyphenated, "-");
    let slug = collapsed.trim_matches('-');

    if slug.len() >= 3 {
        slug.to_string()
    } else {
        fallback_slug(title, now)
    }
}

fn fallback_slug(title: &str, now: NaiveDateTime) -> String {
    let seed = format!("{}{}", title, now.format("%Y%m%d%H%M%S%.f"));
    format!("post-{}-{}", now.format("%Y%m%d"), &hash_code(&seed)[..4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_sanitize_every_illegal_char() {
        for c in ILLEGAL_CHARS {
            assert_eq!(sanitize(&format!("a{}b", c)), "a-b", "char {:?}", c);
        }
    }

    #[test]
    fn test_sanitize_keeps_other_chars() {
        assert_eq!(sanitize("筆記_v2-final"), "筆記_v2-final");
        assert_eq!(sanitize("a　b"), "a-b");
    }

    #[test]
    fn test_hash_code_is_stable() {
        let first = hash_code("posts/tech/a.md");
        assert_eq!(first, hash_code("posts/tech/a.md"));
        assert_eq!(first.len(), 8);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
        assert_ne!(first, hash_code("posts/tech/b.md"));
    }

    #[test]
    fn test_hash_code_empty() {
        assert_eq!(hash_code(""), "00000000");
    }

    #[test]
    fn test_basic_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Rust Programming"), "rust-programming");
    }

    #[test]
    fn test_special_characters() {
        assert_eq!(slugify("Rust & Safety"), "rust-safety");
        assert_eq!(slugify("C++ Programming"), "c-programming");
        assert_eq!(slugify("What's new?"), "whats-new");
    }

    #[test]
    fn test_multiple_spaces_and_hyphens() {
        assert_eq!(slugify("Hello    World"), "hello-world");
        assert_eq!(slugify("--Leading -- Hyphen--"), "leading-hyphen");
    }

    #[test]
    fn test_ascii_folding() {
        assert_eq!(slugify("Café Notes"), "cafe-notes");
        assert_eq!(slugify("naïve"), "naive");
    }

    #[test]
    fn test_transliteration_longest_first() {
        assert_eq!(slugify("技術文章"), "tech-article");
        assert_eq!(slugify("程式碼"), "code");
        assert_eq!(slugify("Rust 程式"), "rust-programming");
    }

    #[test]
    fn test_fallback_pattern() {
        let pattern = Regex::new(r"^post-\d{8}-[a-z0-9]{4}$").unwrap();
        for title in ["", "!!!", "ab", "   "] {
            let slug = slugify(title);
            assert!(pattern.is_match(&slug), "{:?} -> {}", title, slug);
        }
    }

    #[test]
    fn test_fallback_is_deterministic_for_same_now() {
        assert_eq!(slugify_at("!!!", noon()), slugify_at("!!!", noon()));
        assert!(slugify_at("!!!", noon()).starts_with("post-20240309-"));
    }

    #[test]
    fn test_post_file_name() {
        let name = post_file_name("tech/a.md", "hello world");
        assert!(name.ends_with("-hello-world.html"));
        assert_eq!(name, post_file_name("tech/a.md", "hello world"));
        assert_ne!(name, post_file_name("other/a.md", "hello world"));
    }
}
