//! Askama template definitions.

use askama::Template;
use serde::Serialize;
use velo_core::{CategoryNode, Post};

/// A post as shown in listings and on its own page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PostEntry {
    pub title: String,
    /// Output file name, relative to the index
    pub html_file_path: String,
    pub published_date: String,
    pub published_date_long: String,
    pub author: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub first_image_url: String,
    pub image_count: usize,
    pub slug: String,
}

impl PostEntry {
    pub fn new(post: &Post, language: &str) -> Self {
        Self {
            title: post.title.clone(),
            html_file_path: post.output_file_name.clone(),
            published_date: post.published.format("%Y-%m-%d").to_string(),
            published_date_long: post.published.format(long_date_format(language)).to_string(),
            author: post.author.clone().unwrap_or_default(),
            categories: post.categories.clone(),
            tags: post.tags.clone(),
            first_image_url: post.first_image_url.clone(),
            image_count: post.image_paths.len(),
            slug: post.slug.clone(),
        }
    }

    pub fn categories_plain(&self) -> String {
        self.categories.join(" / ")
    }

    /// Category path as used in `data-category-path`
    pub fn category_path(&self) -> String {
        self.categories.join("/")
    }

    pub fn tags_plain(&self) -> String {
        self.tags
            .iter()
            .map(|t| format!("#{}", t))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn categories_html(&self) -> String {
        self.categories
            .iter()
            .map(|c| format!("<span class=\"category\">{}</span>", html_escape(c)))
            .collect()
    }

    pub fn tags_html(&self) -> String {
        self.tags
            .iter()
            .map(|t| format!("<span class=\"tag\">#{}</span>", html_escape(t)))
            .collect()
    }
}

fn long_date_format(language: &str) -> &'static str {
    let language = language.to_ascii_lowercase();
    if language.starts_with("zh") || language.starts_with("ja") {
        "%Y年%m月%d日"
    } else {
        "%B %-d, %Y"
    }
}

/// Render the category tree as nested `category-node` blocks.
pub fn render_category_tree(tree: &CategoryNode) -> String {
    if tree.children.is_empty() {
        return "<p class=\"no-categories\">No categories yet</p>\n".to_string();
    }

    let mut html = String::new();
    for child in &tree.children {
        render_category_node(&mut html, child);
    }
    html
}

fn render_category_node(html: &mut String, node: &CategoryNode) {
    let has_children = !node.children.is_empty();

    html.push_str("<div class=\"category-node\">\n");
    html.push_str(&format!(
        "  <div class=\"category-item\" data-category-path=\"{}\">\n",
        html_escape(&node.path_segment)
    ));
    html.push_str(&format!(
        "    <span class=\"category-name\">{} {}</span>\n",
        if has_children { "📁" } else { "📄" },
        html_escape(&node.name)
    ));
    if node.post_count > 0 {
        html.push_str(&format!(
            "    <span class=\"category-count\">{}</span>\n",
            node.post_count
        ));
    }
    html.push_str("  </div>\n");

    if has_children {
        html.push_str("  <div class=\"category-children\">\n");
        for child in &node.children {
            render_category_node(html, child);
        }
        html.push_str("  </div>\n");
    }

    html.push_str("</div>\n");
}

/// HTML escape function to prevent XSS
pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Built-in index page
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    // Site metadata
    pub site_title: String,
    pub language: String,

    pub posts: Vec<PostEntry>,

    // Category sidebar (pre-rendered HTML)
    pub category_tree_html: String,

    pub generated: String,
}

/// Built-in post page
#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    // Site metadata
    pub site_title: String,
    pub language: String,

    pub post: PostEntry,

    // Rendered markdown body
    pub content: String,
}
