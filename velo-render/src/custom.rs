//! User templates with `{{Placeholder}}` substitution.
//!
//! `{{Name}}` inserts an HTML-escaped value and `{{{Name}}}` inserts it
//! verbatim. Placeholders that already hold markup (`Content`,
//! `CategoryTree`, `PostsJSON`) are never escaped. In the index template a
//! `{{#each Posts}}...{{/each}}` block is repeated once per post. Unknown
//! placeholders are left as they are. Substitution is a single pass, so
//! values are never scanned for further placeholders.

use crate::templates::{html_escape, PostEntry};
use regex::{Captures, Regex};
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\{\s*([A-Za-z]+)\s*\}\}\}|\{\{\s*([A-Za-z]+)\s*\}\}").unwrap()
    })
}

fn each_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{\{#each\s+Posts\s*\}\}(.*?)\{\{/each\}\}").unwrap())
}

/// A placeholder value
enum Value {
    /// Escaped unless written with triple braces
    Text(String),
    /// Always inserted verbatim
    Html(String),
}

/// Values available to the index template outside the loop
pub struct IndexContext<'a> {
    pub posts: &'a [PostEntry],
    pub category_tree_html: &'a str,
    pub generated: &'a str,
    pub site_title: &'a str,
}

fn substitute(template: &str, lookup: &dyn Fn(&str) -> Option<Value>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &Captures| {
            let (name, raw) = match (caps.get(1), caps.get(2)) {
                (Some(m), _) => (m.as_str(), true),
                (None, Some(m)) => (m.as_str(), false),
                (None, None) => return caps[0].to_string(),
            };
            match lookup(name) {
                Some(Value::Text(text)) if !raw => html_escape(&text),
                Some(Value::Text(text)) | Some(Value::Html(text)) => text,
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn post_value(entry: &PostEntry, name: &str) -> Option<Value> {
    let value = match name {
        "Title" => Value::Text(entry.title.clone()),
        "HtmlFilePath" => Value::Text(entry.html_file_path.clone()),
        "PublishedDate" => Value::Text(entry.published_date.clone()),
        "PublishedDateLong" => Value::Text(entry.published_date_long.clone()),
        "Author" => Value::Text(entry.author.clone()),
        "Categories" => Value::Html(entry.categories_html()),
        "CategoriesPlain" => Value::Text(entry.categories_plain()),
        "Tags" => Value::Html(entry.tags_html()),
        "TagsPlain" => Value::Text(entry.tags_plain()),
        "FirstImageUrl" => Value::Text(entry.first_image_url.clone()),
        "ImageCount" => Value::Text(entry.image_count.to_string()),
        "Slug" => Value::Text(entry.slug.clone()),
        _ => return None,
    };
    Some(value)
}

fn index_value(ctx: &IndexContext<'_>, name: &str) -> Option<Value> {
    let value = match name {
        "PostCount" => Value::Text(ctx.posts.len().to_string()),
        "CategoryTree" => Value::Html(ctx.category_tree_html.to_string()),
        "GeneratedDate" => Value::Text(ctx.generated.to_string()),
        "SiteTitle" => Value::Text(ctx.site_title.to_string()),
        "PostsJSON" => Value::Html(posts_json(ctx.posts)),
        _ => return None,
    };
    Some(value)
}

/// Posts as a JSON array, safe to embed inside `<script>`
fn posts_json(posts: &[PostEntry]) -> String {
    match serde_json::to_string(posts) {
        Ok(json) => json.replace("</", "<\\/"),
        Err(err) => {
            tracing::error!("Failed to serialize posts: {}", err);
            "[]".to_string()
        }
    }
}

/// Fill a custom index template.
pub fn render_index(template: &str, ctx: &IndexContext<'_>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut last = 0;

    for caps in each_regex().captures_iter(template) {
        let (Some(block), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        output.push_str(&substitute(&template[last..block.start()], &|name| {
            index_value(ctx, name)
        }));
        for entry in ctx.posts {
            output.push_str(&substitute(body.as_str(), &|name| {
                post_value(entry, name).or_else(|| index_value(ctx, name))
            }));
        }
        last = block.end();
    }

    output.push_str(&substitute(&template[last..], &|name| index_value(ctx, name)));
    output
}

/// Fill a custom post template.
pub fn render_post(template: &str, entry: &PostEntry, content: &str, site_title: &str) -> String {
    substitute(template, &|name| match name {
        "Content" => Some(Value::Html(content.to_string())),
        "SiteTitle" => Some(Value::Text(site_title.to_string())),
        other => post_value(entry, other),
    })
}
