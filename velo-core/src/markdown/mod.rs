//! Markdown processing pipeline with custom extensions.

pub mod autolink;
pub mod emoji;

use crate::fs::FileStoreError;
use crate::images::{strip_local_path_leakage, ImageResolver, IMAGE_URL_PREFIX};
use crate::models::{is_filesystem_path, Post};
use crate::template::{TemplateError, TemplateRenderer};
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd, TextMergeStream};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

pub use autolink::AutolinkTransformer;
pub use emoji::EmojiTransformer;

/// Failure while producing one post's page
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: FileStoreError,
    },
}

fn img_src_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).unwrap())
}

/// Markdown renderer with custom extensions
pub struct MarkdownRenderer {
    options: Options,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self { options }
    }

    /// Convert markdown to HTML with all custom transforms
    pub fn to_html(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, self.options);
        let events: Vec<Event> = TextMergeStream::new(parser).collect();

        let events = AutolinkTransformer::new().transform(events);
        let events = EmojiTransformer::new().transform(events);
        let events = attach_heading_ids(events);

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());
        html_output
    }

    /// Run the full per-post pipeline and return the finished page.
    ///
    /// Image references are resolved through `resolver` (which records what
    /// must be copied), the body HTML is stored on the post together with the
    /// images it shows, and the page produced by `templates` is scrubbed of
    /// leftover `file://` paths.
    pub fn render_post(
        &self,
        post: &mut Post,
        resolver: &mut ImageResolver,
        templates: &dyn TemplateRenderer,
    ) -> Result<String, RenderError> {
        post.clear_images();

        let markdown = resolver.rewrite_markdown(&post.raw_body, post.source_path.as_deref());
        let body = strip_local_path_leakage(&self.to_html(&markdown));

        for src in extract_image_sources(&body) {
            if let Some(path) = web_image_path(&src) {
                post.add_image_path(path);
            }
        }
        post.rendered_html = body;

        let page = templates
            .render_post(post, &post.rendered_html)
            .map_err(|err| {
                tracing::error!("Rendering {:?} failed: {}", post.title, err);
                err
            })?;

        Ok(strip_local_path_leakage(&page))
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Every `<img src>` value in document order
pub fn extract_image_sources(html: &str) -> Vec<String> {
    img_src_regex()
        .captures_iter(html)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Web path recorded for an `<img>` source, or `None` if it must not be
/// published.
fn web_image_path(src: &str) -> Option<String> {
    let lower = src.to_ascii_lowercase();
    if lower.starts_with("file:") {
        tracing::warn!("Skipping local image path {:?}", src);
        return None;
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(src.to_string());
    }
    if lower.starts_with("data:") || is_filesystem_path(src) {
        return None;
    }

    let relative = src.trim_start_matches("./");
    if relative.starts_with(IMAGE_URL_PREFIX) {
        Some(relative.to_string())
    } else {
        Some(format!("{}{}", IMAGE_URL_PREFIX, relative))
    }
}

/// Give every heading without an explicit `{#id}` an id derived from its
/// text, unique within the document.
fn attach_heading_ids(events: Vec<Event<'static>>) -> Vec<Event<'static>> {
    let mut texts = Vec::new();
    let mut current: Option<String> = None;
    for event in &events {
        match event {
            Event::Start(Tag::Heading { .. }) => current = Some(String::new()),
            Event::Text(text) | Event::Code(text) => {
                if let Some(title) = current.as_mut() {
                    title.push_str(text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(title) = current.take() {
                    texts.push(title);
                }
            }
            _ => {}
        }
    }

    let mut used: HashMap<String, usize> = HashMap::new();
    let mut ids = texts.iter().map(|t| unique_heading_id(t, &mut used));
    let mut result = Vec::with_capacity(events.len());

    for event in events {
        match event {
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            }) => {
                let generated = ids.next();
                let id = id.or_else(|| generated.map(|g| CowStr::Boxed(g.into_boxed_str())));
                result.push(Event::Start(Tag::Heading {
                    level,
                    id,
                    classes,
                    attrs,
                }));
            }
            other => result.push(other),
        }
    }

    result
}

fn unique_heading_id(text: &str, used: &mut HashMap<String, usize>) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let base = if words.is_empty() {
        "section".to_string()
    } else {
        words.join("-")
    };

    let count = used.entry(base.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        base
    } else {
        format!("{}-{}", base, *count - 1)
    }
}
