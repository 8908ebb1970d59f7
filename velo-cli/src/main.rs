//! # velo CLI
//!
//! Turns a tree of Markdown posts into a static HTML blog.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use velo_core::{BuildReport, Config, ConfigOverrides, FileStore, LocalFileStore, SiteBuilder};
use velo_render::SiteTemplates;

#[derive(Parser)]
#[command(name = "velo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = velo_core::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Markdown content directory
    #[arg(long)]
    content: Option<PathBuf>,

    /// Output directory for the generated site
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory holding custom index.html / post.html templates
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Output directory for copied images
    #[arg(long)]
    images: Option<PathBuf>,

    /// Empty the output directory before building
    #[arg(long = "clear-output", value_name = "BOOL")]
    clear_output: Option<bool>,

    /// Prepend default front matter to posts that have none
    #[arg(long = "auto-yaml", value_name = "BOOL")]
    auto_yaml: Option<bool>,

    /// Write generated front matter back to the source file
    #[arg(long = "auto-save", value_name = "BOOL")]
    auto_save: Option<bool>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            content: self.content.clone(),
            output: self.output.clone(),
            templates: self.templates.clone(),
            images: self.images.clone(),
            clear_output_on_start: self.clear_output,
            auto_add_front_matter: self.auto_yaml,
            auto_save_front_matter: self.auto_save,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", err);
    }

    match run(&cli) {
        Ok(report) => {
            print_summary(&report);
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    tracing::info!("Loading config from {:?}", cli.config);
    let mut config = Config::from_file(&cli.config).context("Failed to load configuration")?;
    config.apply(cli.overrides());
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<BuildReport> {
    let config = load_config(cli)?;
    tracing::info!("Building site: {}", config.site.title);

    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new());
    let templates = SiteTemplates::load(
        Arc::clone(&store),
        config.templates_dir().as_deref(),
        config.site.clone(),
    )
    .context("Failed to load templates")?;

    let builder = SiteBuilder::new(config, store, Box::new(templates));
    builder.build().context("Failed to build site")
}

fn print_summary(report: &BuildReport) {
    println!(
        "Built {} posts, copied {} images",
        report.posts_written, report.images_copied
    );
    if !report.is_success() {
        println!("{} failures:", report.failures.len());
        for failure in &report.failures {
            match &failure.source_path {
                Some(path) => println!("  {} ({}): {}", failure.subject, path.display(), failure.message),
                None => println!("  {}: {}", failure.subject, failure.message),
            }
        }
    }
}
