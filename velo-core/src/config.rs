//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "velo.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Content directory does not exist: {0:?}")]
    ContentDirectoryMissing(PathBuf),
}

/// Main configuration struct matching the velo.yml schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub build: BuildConfig,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_language")]
    pub language: String,
}

fn default_title() -> String {
    String::from("Velo")
}

fn default_language() -> String {
    String::from("en")
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the Markdown tree
    #[serde(default)]
    pub content: PathBuf,

    /// Where HTML pages are written
    #[serde(default)]
    pub output: PathBuf,

    /// Where images are copied (defaults to `<output>/images`)
    #[serde(default)]
    pub images: Option<PathBuf>,

    /// Custom templates (None means use built-in)
    #[serde(default)]
    pub templates: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub clear_output_on_start: bool,

    #[serde(default)]
    pub auto_add_front_matter: bool,

    #[serde(default)]
    pub auto_save_front_matter: bool,

    #[serde(default = "default_true")]
    pub merge_directory_categories: bool,

    #[serde(default = "default_excluded_directories")]
    pub excluded_directories: Vec<String>,

    /// Two directory names that may stand in for each other when an
    /// absolute image path does not resolve
    #[serde(default)]
    pub image_directory_aliases: Option<(String, String)>,
}

fn default_true() -> bool {
    true
}

/// Directory names never treated as categories
pub fn default_excluded_directories() -> Vec<String> {
    ["drafts", "temp", "tmp", ".git", ".vs", "bin", "obj"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            clear_output_on_start: false,
            auto_add_front_matter: false,
            auto_save_front_matter: false,
            merge_directory_categories: true,
            excluded_directories: default_excluded_directories(),
            image_directory_aliases: None,
        }
    }
}

/// Values supplied on the command line; `None` keeps the file's value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub content: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub templates: Option<PathBuf>,
    pub images: Option<PathBuf>,
    pub clear_output_on_start: Option<bool>,
    pub auto_add_front_matter: Option<bool>,
    pub auto_save_front_matter: Option<bool>,
}

impl Config {
    /// Config with the given roots and defaults everywhere else
    pub fn new(content: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            site: SiteConfig::default(),
            paths: PathsConfig {
                content: content.into(),
                output: output.into(),
                images: None,
                templates: None,
            },
            build: BuildConfig::default(),
            config_path: None,
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Apply command-line overrides. Relative override paths are taken from
    /// the working directory, not the config file.
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        fn from_cwd(path: PathBuf) -> PathBuf {
            if path.is_absolute() {
                return path;
            }
            match std::env::current_dir() {
                Ok(cwd) => cwd.join(path),
                Err(_) => path,
            }
        }

        if let Some(content) = overrides.content {
            self.paths.content = from_cwd(content);
        }
        if let Some(output) = overrides.output {
            self.paths.output = from_cwd(output);
        }
        if let Some(templates) = overrides.templates {
            self.paths.templates = Some(from_cwd(templates));
        }
        if let Some(images) = overrides.images {
            self.paths.images = Some(from_cwd(images));
        }
        if let Some(flag) = overrides.clear_output_on_start {
            self.build.clear_output_on_start = flag;
        }
        if let Some(flag) = overrides.auto_add_front_matter {
            self.build.auto_add_front_matter = flag;
        }
        if let Some(flag) = overrides.auto_save_front_matter {
            self.build.auto_save_front_matter = flag;
        }
    }

    /// Check required settings before anything is read or written.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.content.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("paths.content".to_string()));
        }
        if self.paths.output.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("paths.output".to_string()));
        }

        let content = self.content_dir();
        if !content.is_dir() {
            return Err(ConfigError::ContentDirectoryMissing(content));
        }

        Ok(())
    }

    /// Get the content directory, resolved relative to config file
    pub fn content_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.content)
    }

    /// Get the output directory, resolved relative to config file
    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.output)
    }

    /// Get the image output directory
    pub fn image_output_dir(&self) -> PathBuf {
        match &self.paths.images {
            Some(images) => self.resolve_path(images),
            None => self.output_dir().join("images"),
        }
    }

    /// Get the templates directory (None means use built-in)
    pub fn templates_dir(&self) -> Option<PathBuf> {
        self.paths.templates.as_ref().map(|p| self.resolve_path(p))
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(config_path) = &self.config_path {
            if let Some(parent) = config_path.parent() {
                parent.join(path)
            } else {
                path.to_path_buf()
            }
        } else {
            path.to_path_buf()
        }
    }
}
