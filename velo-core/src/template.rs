//! Page layout seam between the pipeline and a template engine.

use crate::fs::FileStoreError;
use crate::models::{CategoryNode, Post};
use std::path::PathBuf;
use thiserror::Error;

/// Template names looked up in the template directory
pub const INDEX_TEMPLATE: &str = "index.html";
pub const POST_TEMPLATE: &str = "post.html";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: FileStoreError,
    },

    #[error("Failed to render {name}: {message}")]
    Render { name: String, message: String },
}

/// Produces full HTML pages. Implementations fall back to a built-in layout
/// when no custom template exists.
pub trait TemplateRenderer: Send + Sync {
    /// Whether a user-supplied template called `name` is available
    fn has_custom_template(&self, name: &str) -> bool;

    /// The site index listing `posts` (newest first) with category navigation
    fn render_index(&self, posts: &[Post], tree: &CategoryNode) -> Result<String, TemplateError>;

    /// A single post page wrapping `body_html`
    fn render_post(&self, post: &Post, body_html: &str) -> Result<String, TemplateError>;
}
