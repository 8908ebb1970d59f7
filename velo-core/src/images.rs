//! Image reference resolution and the per-build image mapping.
//!
//! Posts refer to images in many shapes: relative paths, absolute paths,
//! `file://` URLs, percent-encoded names. [`ImageResolver`] turns each
//! reference into a flat `images/<name>` URL and records which source file
//! must be copied under that name. Names are unique within one build.

use crate::fs::FileStore;
use percent_encoding::percent_decode_str;
use pulldown_cmark::{Event, Parser, Tag};
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Web-relative directory every local image ends up in
pub const IMAGE_URL_PREFIX: &str = "images/";

/// Marker placed before the file name of an image that could not be found
pub const MISSING_PREFIX: &str = "missing-";

/// Upper bound on [`strip_local_path_leakage`] passes
pub const CLEANUP_PASSES: usize = 3;

/// Source file → output file name, in first-resolved order.
#[derive(Debug, Default, Clone)]
pub struct ImageMapping {
    entries: Vec<(PathBuf, String)>,
    by_source: HashMap<PathBuf, usize>,
    taken: HashSet<String>,
}

impl ImageMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Output name already assigned to `source`
    pub fn get(&self, source: &Path) -> Option<&str> {
        self.by_source
            .get(source)
            .map(|&i| self.entries[i].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.entries
            .iter()
            .map(|(src, name)| (src.as_path(), name.as_str()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_source.clear();
        self.taken.clear();
    }

    /// Assign an output name to `source`, reusing an earlier assignment for
    /// the same file. Clashing names get `_1`, `_2`, ... before the
    /// extension.
    pub fn assign(&mut self, source: PathBuf) -> String {
        if let Some(name) = self.get(&source) {
            return name.to_string();
        }

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let name = self.unique_name(&file_name);

        self.taken.insert(name.to_lowercase());
        self.by_source.insert(source.clone(), self.entries.len());
        self.entries.push((source, name.clone()));
        name
    }

    fn unique_name(&self, file_name: &str) -> String {
        if !self.taken.contains(&file_name.to_lowercase()) {
            return file_name.to_string();
        }

        let (stem, extension) = match file_name.rfind('.') {
            Some(dot) if dot > 0 => file_name.split_at(dot),
            _ => (file_name, ""),
        };
        (1..)
            .map(|n| format!("{}_{}{}", stem, n, extension))
            .find(|candidate| !self.taken.contains(&candidate.to_lowercase()))
            .unwrap_or_else(|| file_name.to_string())
    }
}

/// Resolves image references for one build
pub struct ImageResolver {
    store: Arc<dyn FileStore>,
    content_root: PathBuf,
    aliases: Option<(String, String)>,
    mapping: ImageMapping,
}

impl ImageResolver {
    /// `aliases` names two directories that may stand in for each other in
    /// absolute paths that no longer resolve.
    pub fn new(
        store: Arc<dyn FileStore>,
        content_root: impl Into<PathBuf>,
        aliases: Option<(String, String)>,
    ) -> Self {
        Self {
            store,
            content_root: content_root.into(),
            aliases,
            mapping: ImageMapping::new(),
        }
    }

    pub fn mapping(&self) -> &ImageMapping {
        &self.mapping
    }

    pub fn into_mapping(self) -> ImageMapping {
        self.mapping
    }

    /// Resolve one reference found in the post at `source`.
    ///
    /// Remote URLs come back unchanged. Local files come back as
    /// `images/<name>` and are added to the mapping. Anything that cannot be
    /// found becomes `images/missing-<name>`.
    pub fn resolve(&mut self, reference: &str, source: Option<&Path>) -> String {
        let reference = reference.trim();
        let lower = reference.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:")
        {
            return reference.to_string();
        }

        let stripped = strip_file_scheme(reference);
        let decoded = match percent_decode_str(stripped).decode_utf8() {
            Ok(decoded) => decoded.into_owned(),
            Err(err) => {
                tracing::warn!("Cannot decode image path {:?}: {}", stripped, err);
                stripped.to_string()
            }
        };

        let candidate = Path::new(&decoded);
        let absolute = if candidate.is_absolute() {
            normalize(candidate)
        } else {
            let base = source
                .and_then(Path::parent)
                .unwrap_or(self.content_root.as_path());
            normalize(&base.join(candidate))
        };

        if self.store.is_file(&absolute) {
            return self.register(absolute, reference);
        }

        tracing::debug!("Image {:?} not at {:?}, trying alternates", reference, absolute);
        if let Some(found) = self.find_alternate(&absolute, source) {
            return self.register(found, reference);
        }

        let name = file_name_of(&decoded);
        tracing::warn!("Image not found: {:?} (referenced as {:?})", absolute, reference);
        format!("{}{}{}", IMAGE_URL_PREFIX, MISSING_PREFIX, name)
    }

    fn register(&mut self, path: PathBuf, reference: &str) -> String {
        let name = self.mapping.assign(path);
        tracing::debug!("Image {:?} -> {}{}", reference, IMAGE_URL_PREFIX, name);
        format!("{}{}", IMAGE_URL_PREFIX, name)
    }

    /// Alternate locations, tried in order: alias directory swap, the
    /// post's `<stem>.assets/` directory, then the first same-named file
    /// anywhere under the content root.
    fn find_alternate(&self, missing: &Path, source: Option<&Path>) -> Option<PathBuf> {
        let file_name = missing.file_name()?;

        if let Some((a, b)) = &self.aliases {
            if let Some(swapped) = swap_directory(missing, a, b) {
                if self.store.is_file(&swapped) {
                    return Some(swapped);
                }
            }
        }

        if let Some(source) = source {
            if let (Some(dir), Some(stem)) = (source.parent(), source.file_stem()) {
                let assets = dir
                    .join(format!("{}.assets", stem.to_string_lossy()))
                    .join(file_name);
                if self.store.is_file(&assets) {
                    return Some(assets);
                }
            }
        }

        let extension = Path::new(file_name).extension()?.to_str()?;
        match self.store.list_files(&self.content_root, extension, true) {
            Ok(files) => files
                .into_iter()
                .find(|path| path.file_name() == Some(file_name)),
            Err(err) => {
                tracing::debug!("Cannot search {:?} for {:?}: {}", self.content_root, file_name, err);
                None
            }
        }
    }

    /// Rewrite every image reference in a Markdown document: `![alt](src)`
    /// images and raw `<img src="...">` tags. Code blocks and code spans are
    /// copied through untouched.
    pub fn rewrite_markdown(&mut self, markdown: &str, source: Option<&Path>) -> String {
        let mut output = String::with_capacity(markdown.len());
        let mut last = 0;

        for code in code_ranges(markdown) {
            output.push_str(&self.rewrite_text(&markdown[last..code.start], source));
            output.push_str(&markdown[code.start..code.end]);
            last = code.end;
        }
        output.push_str(&self.rewrite_text(&markdown[last..], source));
        output
    }

    fn rewrite_text(&mut self, markdown: &str, source: Option<&Path>) -> String {
        let rewritten = markdown_image_regex()
            .replace_all(markdown, |caps: &Captures| {
                let raw = &caps["src"];
                let reference = raw
                    .strip_prefix('<')
                    .and_then(|s| s.strip_suffix('>'))
                    .unwrap_or(raw);
                let resolved = self.resolve(reference, source);
                let destination = if resolved.chars().any(char::is_whitespace) {
                    format!("<{}>", resolved)
                } else {
                    resolved
                };
                format!(
                    "![{}]({}{})",
                    &caps["alt"],
                    destination,
                    caps.name("title").map_or("", |m| m.as_str())
                )
            })
            .into_owned();

        html_image_regex()
            .replace_all(&rewritten, |caps: &Captures| {
                format!(
                    "{}{}{}{}",
                    &caps[1],
                    &caps[2],
                    self.resolve(&caps[3], source),
                    &caps[2]
                )
            })
            .into_owned()
    }
}

/// Byte ranges of code blocks and code spans, in order and non-overlapping
fn code_ranges(markdown: &str) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();

    for (event, range) in Parser::new(markdown).into_offset_iter() {
        if !matches!(event, Event::Code(_) | Event::Start(Tag::CodeBlock(_))) {
            continue;
        }
        match ranges.last_mut() {
            Some(previous) if range.start < previous.end => {
                previous.end = previous.end.max(range.end);
            }
            _ => ranges.push(range),
        }
    }

    ranges
}

fn markdown_image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"!\[(?P<alt>[^\]]*)\]\((?P<src><[^>]*>|[^)\s]*)(?P<title>\s+"[^"]*")?\s*\)"#)
            .unwrap()
    })
}

fn html_image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)(<img\b[^>]*?\bsrc\s*=\s*)(["'])([^"']*)["']"#).unwrap())
}

fn file_url_attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(=\s*)(?:"file://([^"]*)"|'file://([^']*)')"#).unwrap()
    })
}

/// Rewrite `file://` attribute values left in rendered HTML to
/// `images/<basename>`.
///
/// Runs until the output stops changing, at most [`CLEANUP_PASSES`] times.
/// Applying it to its own output is a no-op.
pub fn strip_local_path_leakage(html: &str) -> String {
    let mut current = html.to_string();

    for _ in 0..CLEANUP_PASSES {
        let next = file_url_attribute_regex()
            .replace_all(&current, |caps: &Captures| {
                let (quote, path) = match (caps.get(2), caps.get(3)) {
                    (Some(m), _) => ('"', m.as_str()),
                    (None, Some(m)) => ('\'', m.as_str()),
                    (None, None) => ('"', ""),
                };
                let decoded = percent_decode_str(path).decode_utf8_lossy();
                let name = file_name_of(&decoded);
                tracing::warn!("Rewrote local path file://{} -> {}{}", path, IMAGE_URL_PREFIX, name);
                format!("{}{}{}{}{}", &caps[1], quote, IMAGE_URL_PREFIX, name, quote)
            })
            .into_owned();

        if next == current {
            break;
        }
        current = next;
    }

    current
}

/// Drop a `file://` scheme, including the leading `/` before a drive letter
/// (`file:///C:/x` → `C:/x`).
fn strip_file_scheme(reference: &str) -> &str {
    let has_scheme = reference
        .get(..7)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("file://"));
    if !has_scheme {
        return reference;
    }
    let rest = &reference[7..];
    let bytes = rest.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'/' && bytes[1].is_ascii_alphabetic() && bytes[2] == b':' {
        &rest[1..]
    } else {
        rest
    }
}

/// Last segment of a `/` or `\` separated path
fn file_name_of(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or("image")
        .to_string()
}

/// Lexically resolve `.` and `..` without touching the file system.
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Replace the first directory named `a` with `b` (or `b` with `a`).
fn swap_directory(path: &Path, a: &str, b: &str) -> Option<PathBuf> {
    let mut swapped = false;
    let result: PathBuf = path
        .components()
        .map(|c| {
            let s = c.as_os_str();
            if !swapped && s == a {
                swapped = true;
                b.into()
            } else if !swapped && s == b {
                swapped = true;
                a.into()
            } else {
                s.to_os_string()
            }
        })
        .collect();
    swapped.then_some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileStore;
    use std::fs;
    use tempfile::tempdir;

    fn store() -> Arc<dyn FileStore> {
        Arc::new(LocalFileStore::new())
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"img").unwrap();
    }

    #[test]
    fn test_same_name_in_different_folders() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a/photo.jpg"));
        touch(&root.join("b/photo.jpg"));

        let mut resolver = ImageResolver::new(store(), root, None);
        let first = resolver.resolve("photo.jpg", Some(&root.join("a/post.md")));
        let second = resolver.resolve("photo.jpg", Some(&root.join("b/post.md")));

        assert_eq!(first, "images/photo.jpg");
        assert_eq!(second, "images/photo_1.jpg");
        assert_eq!(resolver.mapping().len(), 2);
    }

    #[test]
    fn test_same_file_reuses_name() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a/photo.jpg"));

        let mut resolver = ImageResolver::new(store(), root, None);
        let post = root.join("a/post.md");
        assert_eq!(resolver.resolve("./photo.jpg", Some(&post)), "images/photo.jpg");
        assert_eq!(resolver.resolve("../a/photo.jpg", Some(&post)), "images/photo.jpg");
        assert_eq!(resolver.mapping().len(), 1);
    }

    #[test]
    fn test_remote_passes_through() {
        let dir = tempdir().unwrap();
        let mut resolver = ImageResolver::new(store(), dir.path(), None);
        assert_eq!(
            resolver.resolve("https://example.com/a.png", None),
            "https://example.com/a.png"
        );
        assert!(resolver.mapping().is_empty());
    }

    #[test]
    fn test_missing_image_degrades() {
        let dir = tempdir().unwrap();
        let mut resolver = ImageResolver::new(store(), dir.path(), None);
        let result = resolver.resolve("nowhere/ghost.png", None);
        assert_eq!(result, "images/missing-ghost.png");
        assert!(Regex::new(r"^images/missing-.*").unwrap().is_match(&result));
        assert!(resolver.mapping().is_empty());
    }

    #[test]
    fn test_file_url_and_percent_encoding() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("my pics/圖 1.png");
        touch(&image);

        let encoded = format!(
            "file://{}",
            image.to_string_lossy().replace(' ', "%20").replace("圖", "%E5%9C%96")
        );
        let mut resolver = ImageResolver::new(store(), dir.path(), None);
        assert_eq!(resolver.resolve(&encoded, None), "images/圖 1.png");
        assert_eq!(resolver.mapping().get(&image), Some("圖 1.png"));
    }

    #[test]
    fn test_relative_to_content_root_without_source() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("shared/logo.svg"));
        let mut resolver = ImageResolver::new(store(), dir.path(), None);
        assert_eq!(resolver.resolve("shared/logo.svg", None), "images/logo.svg");
    }

    #[test]
    fn test_alias_swap() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("photo-blog/trip/sea.jpg"));
        let reference = dir.path().join("blog/trip/sea.jpg");

        let mut resolver = ImageResolver::new(
            store(),
            dir.path().join("content"),
            Some(("blog".to_string(), "photo-blog".to_string())),
        );
        assert_eq!(
            resolver.resolve(&reference.to_string_lossy(), None),
            "images/sea.jpg"
        );
        assert_eq!(
            resolver.mapping().get(&dir.path().join("photo-blog/trip/sea.jpg")),
            Some("sea.jpg")
        );
    }

    #[test]
    fn test_assets_directory_and_tree_search() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("notes/post.assets/diagram.png"));
        touch(&root.join("elsewhere/deep/chart.png"));
        let post = root.join("notes/post.md");

        let mut resolver = ImageResolver::new(store(), root, None);
        assert_eq!(resolver.resolve("diagram.png", Some(&post)), "images/diagram.png");
        assert_eq!(resolver.resolve("img/chart.png", Some(&post)), "images/chart.png");
        assert_eq!(
            resolver.mapping().get(&root.join("elsewhere/deep/chart.png")),
            Some("chart.png")
        );
    }

    #[test]
    fn test_rewrite_markdown() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("tech/img.png"));
        touch(&root.join("tech/my shot.png"));
        let post = root.join("tech/a.md");

        let markdown = concat!(
            "![one](./img.png \"Title\")\n",
            "![two](<my shot.png>)\n",
            "![remote](https://example.com/x.png)\n",
            "<img alt=\"raw\" src='./img.png'>\n",
            "[not an image](./img.png)\n",
        );
        let mut resolver = ImageResolver::new(store(), root, None);
        let rewritten = resolver.rewrite_markdown(markdown, Some(&post));

        assert!(rewritten.contains("![one](images/img.png \"Title\")"));
        assert!(rewritten.contains("![two](<images/my shot.png>)"));
        assert!(rewritten.contains("![remote](https://example.com/x.png)"));
        assert!(rewritten.contains("<img alt=\"raw\" src='images/img.png'>"));
        assert!(rewritten.contains("[not an image](./img.png)"));
        assert_eq!(resolver.mapping().len(), 2);
    }

    #[test]
    fn test_cjk_references() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("部落格/x.png"));

        let mut resolver = ImageResolver::new(store(), root, None);
        assert_eq!(resolver.resolve("部落格/x.png", None), "images/x.png");
        assert_eq!(resolver.resolve("部落格/sea.jpg", None), "images/missing-sea.jpg");
        assert_eq!(resolver.resolve("ab圖片.png", None), "images/missing-ab圖片.png");
        assert_eq!(resolver.resolve("file://部落格/y.png", None), "images/missing-y.png");
        assert_eq!(resolver.resolve("FILE://部落格/x.png", None), "images/x.png");

        let rewritten = resolver.rewrite_markdown("![照片](攝影部落格/a.png)", None);
        assert_eq!(rewritten, "![照片](images/missing-a.png)");
        assert_eq!(resolver.mapping().len(), 1);
    }

    #[test]
    fn test_rewrite_skips_code() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("logo.png"));
        touch(&root.join("y.png"));

        let markdown = concat!(
            "```markdown\n",
            "![logo](./logo.png)\n",
            "<img src=\"./logo.png\">\n",
            "```\n\n",
            "Write `![x](y.png)` to embed.\n\n",
            "    ![indented](./logo.png)\n",
        );
        let mut resolver = ImageResolver::new(store(), root, None);
        let rewritten = resolver.rewrite_markdown(markdown, None);

        assert_eq!(rewritten, markdown);
        assert!(resolver.mapping().is_empty());

        let mixed = "`![x](y.png)` and ![real](y.png)";
        assert_eq!(
            resolver.rewrite_markdown(mixed, None),
            "`![x](y.png)` and ![real](images/y.png)"
        );
        assert_eq!(resolver.mapping().len(), 1);
    }

    #[test]
    fn test_cleanup_rewrites_file_urls() {
        let html = r#"<img src="file:///C:/Users/me/My%20Pics/a.png"><a href='file:///tmp/b.jpg'>b</a>"#;
        let cleaned = strip_local_path_leakage(html);
        assert_eq!(
            cleaned,
            r#"<img src="images/a.png"><a href='images/b.jpg'>b</a>"#
        );
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let html = r#"<p><img data-src = "file://D:\pics\c.gif" src="images/x.png"></p>"#;
        let once = strip_local_path_leakage(html);
        let twice = strip_local_path_leakage(&once);
        assert_eq!(once, twice);
        assert!(!once.to_lowercase().contains("file://"));
        assert!(once.contains(r#"data-src = "images/c.gif""#));
    }

    #[test]
    fn test_cleanup_leaves_clean_html() {
        let html = "<p>file:// in text is left alone</p>";
        assert_eq!(strip_local_path_leakage(html), html);
    }

    #[test]
    fn test_unique_name_case_insensitive() {
        let mut mapping = ImageMapping::new();
        assert_eq!(mapping.assign(PathBuf::from("/a/Photo.JPG")), "Photo.JPG");
        assert_eq!(mapping.assign(PathBuf::from("/b/photo.jpg")), "photo_1.jpg");
        assert_eq!(mapping.assign(PathBuf::from("/c/photo.jpg")), "photo_2.jpg");
        assert_eq!(mapping.assign(PathBuf::from("/d/README")), "README");
        assert_eq!(mapping.assign(PathBuf::from("/e/README")), "README_1");
        mapping.clear();
        assert!(mapping.is_empty());
    }
}
