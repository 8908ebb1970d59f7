//! Site building logic - orchestrates loading, rendering, and output.

use crate::{
    config::{Config, ConfigError},
    fs::{FileStore, FileStoreError},
    images::{strip_local_path_leakage, ImageResolver},
    markdown::{MarkdownRenderer, RenderError},
    models::{CategoryNode, Post},
    repository::{PostRepository, RepositoryError, ScanOptions},
    template::TemplateRenderer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// File name of the generated index page
pub const INDEX_FILE: &str = "index.html";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load posts: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Cannot prepare output directory {path:?}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: FileStoreError,
    },

    #[error("Failed to produce index page: {0}")]
    Index(#[source] RenderError),
}

/// Something that went wrong for one post or one image without stopping
/// the build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    /// Post title or image file name
    pub subject: String,
    pub source_path: Option<PathBuf>,
    pub message: String,
}

/// Totals for a finished build
#[derive(Debug, Default, Clone)]
pub struct BuildReport {
    pub posts_written: usize,
    pub images_copied: usize,
    pub failures: Vec<BuildFailure>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Main site builder
pub struct SiteBuilder {
    config: Config,
    store: Arc<dyn FileStore>,
    templates: Box<dyn TemplateRenderer>,
    repository: PostRepository,
    renderer: MarkdownRenderer,
}

impl SiteBuilder {
    pub fn new(
        config: Config,
        store: Arc<dyn FileStore>,
        templates: Box<dyn TemplateRenderer>,
    ) -> Self {
        let repository = PostRepository::new(Arc::clone(&store), ScanOptions::from_config(&config));
        Self {
            config,
            store,
            templates,
            repository,
            renderer: MarkdownRenderer::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &PostRepository {
        &self.repository
    }

    /// Build the entire site.
    ///
    /// Configuration and output directory problems abort before anything is
    /// written. A post or image that fails is recorded in the report and the
    /// build carries on with the rest.
    pub fn build(&self) -> Result<BuildReport, BuildError> {
        self.config.validate()?;
        self.prepare_output()?;

        self.repository.force_reload()?;
        let mut posts = self.repository.all_posts()?;
        tracing::info!("Building {} posts", posts.len());

        let mut report = BuildReport::default();
        let mut resolver = ImageResolver::new(
            Arc::clone(&self.store),
            self.config.content_dir(),
            self.config.build.image_directory_aliases.clone(),
        );

        let mut published = Vec::with_capacity(posts.len());
        for mut post in posts.drain(..) {
            match self.write_post(&mut post, &mut resolver) {
                Ok(path) => {
                    tracing::debug!("Wrote {:?}", path);
                    report.posts_written += 1;
                    published.push(post);
                }
                Err(err) => {
                    tracing::error!("Failed to build {:?} ({:?}): {}", post.title, post.source_path, err);
                    report.failures.push(BuildFailure {
                        subject: post.title.clone(),
                        source_path: post.source_path.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        self.copy_images(resolver, &mut report);
        self.write_index(&published)?;

        tracing::info!(
            "Built {} posts, copied {} images, {} failures",
            report.posts_written,
            report.images_copied,
            report.failures.len()
        );
        Ok(report)
    }

    fn prepare_output(&self) -> Result<(), BuildError> {
        let output = self.config.output_dir();

        if self.config.build.clear_output_on_start && self.store.exists(&output) {
            match self.store.clear_directory(&output) {
                Ok(cleared) => {
                    tracing::info!("Cleared {} entries from {:?}", cleared.removed, output);
                    for path in &cleared.failed {
                        tracing::warn!("Could not remove {:?}", path);
                    }
                }
                Err(err) => tracing::warn!("Could not clear {:?}: {}", output, err),
            }
        }

        for dir in [output, self.config.image_output_dir()] {
            self.store
                .ensure_directory_exists(&dir)
                .map_err(|source| BuildError::OutputDirectory { path: dir, source })?;
        }
        Ok(())
    }

    fn write_post(&self, post: &mut Post, resolver: &mut ImageResolver) -> Result<PathBuf, RenderError> {
        let page = self
            .renderer
            .render_post(post, resolver, self.templates.as_ref())?;
        let path = self.post_output_path(post);
        self.store
            .write_text(&path, &page)
            .map_err(|source| RenderError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    fn copy_images(&self, resolver: ImageResolver, report: &mut BuildReport) {
        let image_dir = self.config.image_output_dir();
        let mapping = resolver.into_mapping();

        for (source, name) in mapping.iter() {
            match self.store.copy_file(source, &image_dir.join(name), true) {
                Ok(_) => report.images_copied += 1,
                Err(err) => {
                    tracing::error!("Failed to copy image {:?}: {}", source, err);
                    report.failures.push(BuildFailure {
                        subject: name.to_string(),
                        source_path: Some(source.to_path_buf()),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    fn write_index(&self, posts: &[Post]) -> Result<(), BuildError> {
        let tree = CategoryNode::build(posts);
        let html = self
            .templates
            .render_index(posts, &tree)
            .map_err(|err| BuildError::Index(err.into()))?;
        let html = strip_local_path_leakage(&html);

        let path = self.config.output_dir().join(INDEX_FILE);
        self.store.write_text(&path, &html).map_err(|source| {
            BuildError::Index(RenderError::Io {
                path: path.clone(),
                source,
            })
        })?;
        tracing::info!("Wrote index with {} posts", posts.len());
        Ok(())
    }

    /// Where the page for `post` is written
    pub fn post_output_path(&self, post: &Post) -> PathBuf {
        output_path(&self.config.output_dir(), post)
    }
}

fn output_path(output_dir: &Path, post: &Post) -> PathBuf {
    output_dir.join(&post.output_file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileStore;
    use crate::template::TemplateError;
    use std::fs;
    use tempfile::tempdir;

    struct PlainTemplates;

    impl TemplateRenderer for PlainTemplates {
        fn has_custom_template(&self, _name: &str) -> bool {
            false
        }

        fn render_index(&self, posts: &[Post], tree: &CategoryNode) -> Result<String, TemplateError> {
            let mut html = format!("<p>{} posts</p>", posts.len());
            for child in &tree.children {
                html.push_str(&format!("<li>{} ({})</li>", child.name, child.post_count));
            }
            for post in posts {
                html.push_str(&format!("<a href=\"{}\">{}</a>", post.output_file_name, post.title));
            }
            Ok(html)
        }

        fn render_post(&self, post: &Post, body_html: &str) -> Result<String, TemplateError> {
            if post.title == "explode" {
                return Err(TemplateError::Render {
                    name: "post.html".to_string(),
                    message: "bad template".to_string(),
                });
            }
            Ok(format!("<h1>{}</h1>{}", post.title, body_html))
        }
    }

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn builder(config: Config) -> SiteBuilder {
        SiteBuilder::new(config, Arc::new(LocalFileStore::new()), Box::new(PlainTemplates))
    }

    fn html_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".html"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_build_writes_posts_images_and_index() {
        let dir = tempdir().unwrap();
        let content = dir.path().join("posts");
        let output = dir.path().join("site");
        write(&content, "tech/a.md", b"![pic](./img.png)\n");
        write(&content, "tech/img.png", b"png");
        write(&content, "drafts/b.md", b"---\ndraft: true\n---\nhidden");

        let site = builder(Config::new(&content, &output));
        let report = site.build().unwrap();

        assert!(report.is_success());
        assert_eq!(report.posts_written, 1);
        assert_eq!(report.images_copied, 1);
        assert_eq!(html_files(&output).len(), 2);
        assert_eq!(fs::read(output.join("images/img.png")).unwrap(), b"png");

        let index = fs::read_to_string(output.join(INDEX_FILE)).unwrap();
        assert!(index.contains("<p>1 posts</p>"));
        assert!(index.contains("<li>tech (1)</li>"));

        let post = site.repository().all_posts().unwrap().remove(0);
        let page = fs::read_to_string(site.post_output_path(&post)).unwrap();
        assert!(page.contains("src=\"images/img.png\""));
    }

    #[test]
    fn test_failed_post_does_not_stop_build() {
        let dir = tempdir().unwrap();
        let content = dir.path().join("posts");
        let output = dir.path().join("site");
        write(&content, "ok.md", b"fine");
        write(&content, "bad.md", b"---\ntitle: explode\n---\nbody");

        let report = builder(Config::new(&content, &output)).build().unwrap();

        assert!(!report.is_success());
        assert_eq!(report.posts_written, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].subject, "explode");

        let index = fs::read_to_string(output.join(INDEX_FILE)).unwrap();
        assert!(index.contains("<p>1 posts</p>"));
    }

    #[test]
    fn test_missing_content_fails_before_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("site");

        let result = builder(Config::new(dir.path().join("missing"), &output)).build();
        assert!(matches!(
            result,
            Err(BuildError::Config(ConfigError::ContentDirectoryMissing(_)))
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_clear_output_on_start() {
        let dir = tempdir().unwrap();
        let content = dir.path().join("posts");
        let output = dir.path().join("site");
        write(&content, "a.md", b"text");
        write(&output, "stale.html", b"old");

        let mut config = Config::new(&content, &output);
        config.build.clear_output_on_start = true;
        builder(config).build().unwrap();

        assert!(!output.join("stale.html").exists());
        assert!(output.join(INDEX_FILE).exists());
    }

    #[test]
    fn test_rebuild_is_stable() {
        let dir = tempdir().unwrap();
        let content = dir.path().join("posts");
        let output = dir.path().join("site");
        write(&content, "notes/Hello World.md", b"hello");

        let site = builder(Config::new(&content, &output));
        site.build().unwrap();
        let first = html_files(&output);
        site.build().unwrap();
        assert_eq!(first, html_files(&output));
    }
}
