//! Content model structs for posts and the category tree.

use crate::path::{post_file_name, slugify};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::path::PathBuf;

/// A single parsed article
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    /// Display title (falls back to the file stem)
    pub title: String,

    /// URL slug, never empty
    pub slug: String,

    /// Absolute path of the source file; `None` for synthetic posts
    pub source_path: Option<PathBuf>,

    /// Markdown body without front matter
    pub raw_body: String,

    /// Rendered HTML body, filled in by the renderer
    pub rendered_html: String,

    /// From front matter `date`, or the file's modification time
    pub published: NaiveDateTime,

    pub author: Option<String>,

    /// Tags in front matter order
    pub tags: Vec<String>,

    /// Category path, root to leaf
    pub categories: Vec<String>,

    /// Web-relative or remote image URLs in first-seen order
    pub image_paths: Vec<String>,

    /// First entry of `image_paths`, or empty
    pub first_image_url: String,

    /// Flat output file name (e.g. `3fa2c91b-hello-world.html`)
    pub output_file_name: String,
}

impl Post {
    /// Create a post that has no backing source file.
    ///
    /// An empty `slug` is replaced by one generated from `title`.
    pub fn new(title: impl Into<String>, slug: impl Into<String>) -> Self {
        let title = title.into();
        let mut slug = slug.into();
        if slug.trim().is_empty() {
            slug = slugify(&title);
        }
        let output_file_name = post_file_name(&format!("{}\n{}", title, slug), &slug);

        Self {
            title,
            slug,
            source_path: None,
            raw_body: String::new(),
            rendered_html: String::new(),
            published: Local::now().naive_local(),
            author: None,
            tags: Vec::new(),
            categories: Vec::new(),
            image_paths: Vec::new(),
            first_image_url: String::new(),
            output_file_name,
        }
    }

    /// Forget every image recorded by a previous render.
    pub fn clear_images(&mut self) {
        self.image_paths.clear();
        self.first_image_url.clear();
    }

    /// Record an image URL. Returns `false` for duplicates and for anything
    /// that looks like a local filesystem path.
    pub fn add_image_path(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        if path.is_empty() || is_filesystem_path(&path) || self.image_paths.contains(&path) {
            return false;
        }

        if self.first_image_url.is_empty() {
            self.first_image_url = path.clone();
        }
        self.image_paths.push(path);
        true
    }

    /// Category path joined with `/`
    pub fn category_path(&self) -> String {
        self.categories.join("/")
    }
}

/// Whether `path` is an absolute filesystem path or a `file://` URL rather
/// than something a browser can load relative to the site.
pub fn is_filesystem_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    if lower.starts_with("file:") {
        return true;
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && matches!(bytes[2], b'\\' | b'/')
}

/// A node of the category tree
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CategoryNode {
    pub name: String,

    /// Slash-joined path from the root (empty for the root itself)
    pub path_segment: String,

    /// Posts ending exactly here plus all descendants' counts
    pub post_count: usize,

    /// Children in first-encountered order
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    pub fn new(name: impl Into<String>, path_segment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path_segment: path_segment.into(),
            post_count: 0,
            children: Vec::new(),
        }
    }

    /// Find a descendant by its slash-joined path.
    pub fn find(&self, path: &str) -> Option<&CategoryNode> {
        let mut node = self;
        for name in path.split('/').filter(|s| !s.is_empty()) {
            node = node.children.iter().find(|c| c.name == name)?;
        }
        Some(node)
    }
}
