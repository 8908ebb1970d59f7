//! # velo-core
//!
//! Core library for the velo static blog generator.
//!
//! This crate turns a directory of Markdown posts into a flat HTML site:
//! loading posts and their front matter, deriving categories, resolving
//! image references, and rendering pages through a [`TemplateRenderer`].

pub mod builder;
pub mod category;
pub mod config;
pub mod frontmatter;
pub mod fs;
pub mod images;
pub mod markdown;
pub mod models;
pub mod path;
pub mod repository;
pub mod template;

pub use builder::{BuildError, BuildFailure, BuildReport, SiteBuilder};
pub use category::CategoryClassifier;
pub use config::{Config, ConfigError, ConfigOverrides};
pub use frontmatter::Frontmatter;
pub use fs::{FileStore, FileStoreError, LocalFileStore};
pub use images::{strip_local_path_leakage, ImageMapping, ImageResolver};
pub use markdown::{MarkdownRenderer, RenderError};
pub use models::{CategoryNode, Post};
pub use path::{hash_code, sanitize, slugify};
pub use repository::{PostRepository, RepositoryError, ScanOptions};
pub use template::{TemplateError, TemplateRenderer};
