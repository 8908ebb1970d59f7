//! Loading posts from the content tree.
//!
//! The repository scans every `.md` file under the content root, turns each
//! into a [`Post`], drops drafts, and keeps the result as one immutable
//! snapshot. The snapshot is built lazily on first read and replaced as a
//! whole on reload, so readers never see a partially scanned collection.

use crate::category::CategoryClassifier;
use crate::config::Config;
use crate::frontmatter::{default_front_matter, split_front_matter, Frontmatter, FrontmatterError};
use crate::fs::{FileStore, FileStoreError};
use crate::models::{CategoryNode, Post};
use crate::path::{post_file_name, slugify_at};
use chrono::{Local, NaiveDateTime};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// File name prefix marking a draft
pub const DRAFT_PREFIX: &str = "draft-";

/// Directory name marking everything below it as drafts
pub const DRAFT_DIRECTORY: &str = "drafts";

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Content directory does not exist: {0:?}")]
    ContentDirectoryMissing(PathBuf),

    #[error("Failed to scan {path:?}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: FileStoreError,
    },
}

/// Why a single file was left out of the collection
#[derive(Error, Debug)]
pub enum PostParseError {
    #[error("Failed to read post: {0}")]
    Read(#[from] FileStoreError),

    #[error("Invalid front matter: {0}")]
    Frontmatter(#[from] FrontmatterError),
}

/// Settings the scanner reads from the site configuration
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub content_root: PathBuf,
    pub excluded_directories: Vec<String>,
    pub merge_directory_categories: bool,
    pub auto_add_front_matter: bool,
    pub auto_save_front_matter: bool,
}

impl ScanOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            content_root: config.content_dir(),
            excluded_directories: config.build.excluded_directories.clone(),
            merge_directory_categories: config.build.merge_directory_categories,
            auto_add_front_matter: config.build.auto_add_front_matter,
            auto_save_front_matter: config.build.auto_save_front_matter,
        }
    }
}

/// Thread-safe, lazily loaded collection of published posts
pub struct PostRepository {
    store: Arc<dyn FileStore>,
    options: ScanOptions,
    classifier: CategoryClassifier,
    snapshot: RwLock<Option<Arc<Vec<Post>>>>,
    load_guard: Mutex<()>,
}

impl PostRepository {
    pub fn new(store: Arc<dyn FileStore>, options: ScanOptions) -> Self {
        let classifier =
            CategoryClassifier::new(options.content_root.clone(), &options.excluded_directories);
        Self {
            store,
            options,
            classifier,
            snapshot: RwLock::new(None),
            load_guard: Mutex::new(()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// All posts, newest first
    pub fn all_posts(&self) -> Result<Vec<Post>, RepositoryError> {
        Ok(self.posts()?.as_ref().clone())
    }

    pub fn post_by_slug(&self, slug: &str) -> Result<Option<Post>, RepositoryError> {
        Ok(self.posts()?.iter().find(|p| p.slug == slug).cloned())
    }

    /// Case-insensitive substring search over title, body, tags and
    /// categories. A blank query returns every post.
    pub fn search(&self, query: &str) -> Result<Vec<Post>, RepositoryError> {
        let posts = self.posts()?;
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(posts.as_ref().clone());
        }

        let contains = |s: &str| s.to_lowercase().contains(&needle);
        Ok(posts
            .iter()
            .filter(|p| {
                contains(&p.title)
                    || contains(&p.raw_body)
                    || p.tags.iter().any(|t| contains(t))
                    || p.categories.iter().any(|c| contains(c))
            })
            .cloned()
            .collect())
    }

    /// Category tree built from the current snapshot
    pub fn category_tree(&self) -> Result<CategoryNode, RepositoryError> {
        Ok(CategoryNode::build(&self.posts()?))
    }

    pub fn len(&self) -> Result<usize, RepositoryError> {
        Ok(self.posts()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, RepositoryError> {
        Ok(self.len()? == 0)
    }

    /// Drop the snapshot and scan again.
    pub fn force_reload(&self) -> Result<usize, RepositoryError> {
        let _guard = self.load_guard.lock();
        *self.snapshot.write() = None;

        let posts = Arc::new(self.load()?);
        let count = posts.len();
        *self.snapshot.write() = Some(posts);
        Ok(count)
    }

    /// Current snapshot, loading it on first use. Concurrent first readers
    /// wait on the load guard so only one scan runs.
    fn posts(&self) -> Result<Arc<Vec<Post>>, RepositoryError> {
        if let Some(posts) = self.snapshot.read().as_ref() {
            return Ok(Arc::clone(posts));
        }

        let _guard = self.load_guard.lock();
        if let Some(posts) = self.snapshot.read().as_ref() {
            return Ok(Arc::clone(posts));
        }

        let posts = Arc::new(self.load()?);
        *self.snapshot.write() = Some(Arc::clone(&posts));
        Ok(posts)
    }

    fn load(&self) -> Result<Vec<Post>, RepositoryError> {
        let root = &self.options.content_root;
        if !self.store.exists(root) {
            return Err(RepositoryError::ContentDirectoryMissing(root.clone()));
        }

        let files = self
            .store
            .list_files(root, "md", true)
            .map_err(|source| match source {
                FileStoreError::NotFound(_) => RepositoryError::ContentDirectoryMissing(root.clone()),
                source => RepositoryError::Scan {
                    path: root.clone(),
                    source,
                },
            })?;
        tracing::info!("Scanning {} markdown files in {:?}", files.len(), root);

        let mut posts = Vec::new();
        for file in &files {
            match self.parse_file(file) {
                Ok(Some(post)) => posts.push(post),
                Ok(None) => tracing::info!("Skipping draft {:?}", file),
                Err(err) => tracing::warn!("Skipping {:?}: {}", file, err),
            }
        }

        posts.sort_by(|a, b| {
            b.published
                .cmp(&a.published)
                .then_with(|| a.output_file_name.cmp(&b.output_file_name))
        });
        warn_duplicate_slugs(&posts);

        tracing::info!("Loaded {} posts", posts.len());
        Ok(posts)
    }

    /// Parse one file. `Ok(None)` means the file is a draft.
    pub fn parse_file(&self, path: &Path) -> Result<Option<Post>, PostParseError> {
        let mut content = self.store.read_text(path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let relative = relative_key(&self.options.content_root, path);
        let modified = match self.store.last_modified(path) {
            Ok(time) => time,
            Err(err) => {
                tracing::debug!("No modification time for {:?}: {}", path, err);
                Local::now().naive_local()
            }
        };
        let directory_categories = self.classifier.directory_categories(path);

        if split_front_matter(&content).is_none() && self.options.auto_add_front_matter {
            content = self.synthesize(path, &stem, modified, &directory_categories, &content);
        }

        let (frontmatter, body) = match split_front_matter(&content) {
            Some((yaml, body)) => (Frontmatter::parse(yaml)?, body),
            None => (Frontmatter::default(), content.trim_start()),
        };

        let draft = frontmatter
            .draft
            .unwrap_or_else(|| is_draft_path(&relative));
        if draft {
            return Ok(None);
        }

        let title = frontmatter
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or(stem);
        let published = frontmatter.published().unwrap_or_else(|| {
            if let Some(raw) = &frontmatter.date {
                tracing::warn!("Unrecognised date {:?} in {:?}", raw, path);
            }
            modified
        });
        let slug = frontmatter
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| slugify_at(&title, published));
        let declared = frontmatter.declared_categories().unwrap_or_default();
        let categories = CategoryClassifier::resolve(
            &directory_categories,
            &declared,
            self.options.merge_directory_categories,
        );

        tracing::debug!("{:?} categories: {:?}", title, categories);

        let mut post = Post::new(title, slug);
        post.output_file_name = post_file_name(&relative, &post.slug);
        post.source_path = Some(path.to_path_buf());
        post.raw_body = body.to_string();
        post.published = published;
        post.author = frontmatter.author.filter(|a| !a.trim().is_empty());
        post.tags = frontmatter.tags.unwrap_or_default();
        post.categories = categories;

        Ok(Some(post))
    }

    /// Prepend a default front matter block, writing it back to disk when
    /// configured to.
    fn synthesize(
        &self,
        path: &Path,
        stem: &str,
        modified: NaiveDateTime,
        categories: &[String],
        content: &str,
    ) -> String {
        let block = default_front_matter(
            stem,
            Local::now().naive_local(),
            categories,
            &slugify_at(stem, modified),
        );
        let updated = format!("{}{}", block, content);

        if self.options.auto_save_front_matter {
            match self.store.write_text(path, &updated) {
                Ok(()) => tracing::info!("Added front matter to {:?}", path),
                Err(err) => tracing::warn!("Could not save front matter to {:?}: {}", path, err),
            }
        } else {
            tracing::info!("Added front matter to {:?} (in memory only)", path);
        }

        updated
    }
}

/// Source path relative to `root`, `/`-separated
fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Draft markers in a relative path: a `draft-` file name prefix or a
/// `drafts` directory, both case-insensitive.
fn is_draft_path(relative: &str) -> bool {
    let mut segments: Vec<&str> = relative.split('/').collect();
    let file_name = segments.pop().unwrap_or_default().to_lowercase();

    file_name.starts_with(DRAFT_PREFIX)
        || segments
            .iter()
            .any(|s| s.eq_ignore_ascii_case(DRAFT_DIRECTORY))
}

fn warn_duplicate_slugs(posts: &[Post]) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for post in posts {
        *seen.entry(post.slug.as_str()).or_default() += 1;
    }
    for (slug, count) in seen {
        if count > 1 {
            tracing::warn!("Slug {:?} is shared by {} posts", slug, count);
        }
    }
}
