//! [`TemplateRenderer`] backed by user templates with built-in fallbacks.

use crate::custom::{self, IndexContext};
use crate::templates::{render_category_tree, IndexTemplate, PostEntry, PostTemplate};
use askama::Template;
use chrono::Local;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use velo_core::config::SiteConfig;
use velo_core::template::{INDEX_TEMPLATE, POST_TEMPLATE};
use velo_core::{CategoryNode, FileStore, Post, TemplateError, TemplateRenderer};

/// Site page renderer.
///
/// Custom templates are read once, when the renderer is created.
pub struct SiteTemplates {
    site: SiteConfig,
    template_dir: Option<PathBuf>,
    custom: HashMap<String, String>,
}

impl SiteTemplates {
    /// Renderer that only uses the built-in layouts
    pub fn builtin(site: SiteConfig) -> Self {
        Self {
            site,
            template_dir: None,
            custom: HashMap::new(),
        }
    }

    /// Load `index.html` and `post.html` from `template_dir` when present.
    pub fn load(
        store: Arc<dyn FileStore>,
        template_dir: Option<&Path>,
        site: SiteConfig,
    ) -> Result<Self, TemplateError> {
        let mut custom = HashMap::new();

        if let Some(dir) = template_dir {
            for name in [INDEX_TEMPLATE, POST_TEMPLATE] {
                let path = dir.join(name);
                match store.read_text(&path) {
                    Ok(text) => {
                        tracing::info!("Using custom template {:?}", path);
                        custom.insert(name.to_string(), text);
                    }
                    Err(err) if err.is_not_found() => {
                        tracing::debug!("No custom {} in {:?}, using built-in", name, dir);
                    }
                    Err(source) => return Err(TemplateError::Io { path, source }),
                }
            }
        }

        Ok(Self {
            site,
            template_dir: template_dir.map(Path::to_path_buf),
            custom,
        })
    }

    pub fn template_dir(&self) -> Option<&Path> {
        self.template_dir.as_deref()
    }

    fn custom_template(&self, name: &str) -> Option<&str> {
        self.custom.get(&template_file_name(name)).map(String::as_str)
    }
}

/// `index` and `index.html` name the same template
fn template_file_name(name: &str) -> String {
    if Path::new(name).extension().is_some() {
        name.to_string()
    } else {
        format!("{}.html", name)
    }
}

fn render_error(name: &str, err: askama::Error) -> TemplateError {
    TemplateError::Render {
        name: name.to_string(),
        message: err.to_string(),
    }
}

impl TemplateRenderer for SiteTemplates {
    fn has_custom_template(&self, name: &str) -> bool {
        self.custom_template(name).is_some()
    }

    fn render_index(&self, posts: &[Post], tree: &CategoryNode) -> Result<String, TemplateError> {
        let entries: Vec<PostEntry> = posts
            .iter()
            .map(|p| PostEntry::new(p, &self.site.language))
            .collect();
        let category_tree_html = render_category_tree(tree);
        let generated = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        if let Some(template) = self.custom_template(INDEX_TEMPLATE) {
            let ctx = IndexContext {
                posts: &entries,
                category_tree_html: &category_tree_html,
                generated: &generated,
                site_title: &self.site.title,
            };
            return Ok(custom::render_index(template, &ctx));
        }

        IndexTemplate {
            site_title: self.site.title.clone(),
            language: self.site.language.clone(),
            posts: entries,
            category_tree_html,
            generated,
        }
        .render()
        .map_err(|e| render_error(INDEX_TEMPLATE, e))
    }

    fn render_post(&self, post: &Post, body_html: &str) -> Result<String, TemplateError> {
        let entry = PostEntry::new(post, &self.site.language);

        if let Some(template) = self.custom_template(POST_TEMPLATE) {
            return Ok(custom::render_post(
                template,
                &entry,
                body_html,
                &self.site.title,
            ));
        }

        PostTemplate {
            site_title: self.site.title.clone(),
            language: self.site.language.clone(),
            post: entry,
            content: body_html.to_string(),
        }
        .render()
        .map_err(|e| render_error(POST_TEMPLATE, e))
    }
}
