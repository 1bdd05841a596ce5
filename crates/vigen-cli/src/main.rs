//! vigen CLI
//!
//! Generate validated multiple-choice items from images and extract item
//! layout from rendered exam pages.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use vigen_core::{list_images, Category, Difficulty, PageSize};
use vigen_runtime::{
    statistics, ArtifactStore, PageExtractor, Pipeline, ProviderRegistry, RunOptions, Settings, UsageTracker,
    VisionClient, VisionProvider,
};

#[derive(Parser)]
#[command(name = "vigen")]
#[command(about = "Vision-grounded item generation with judge validation")]
#[command(version)]
struct Cli {
    /// YAML settings file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Provider type from the registry
    #[arg(long, global = true, default_value = "gemini")]
    provider: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one item from an image
    Generate {
        /// Source image
        #[arg(short, long)]
        image: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Generate one item per image in a directory
    Batch {
        /// Directory of images
        #[arg(short = 'D', long)]
        dir: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Extract item and passage boxes from rendered page images
    Extract {
        /// Directory of page images, one per page, in file name order
        #[arg(short, long)]
        pages: PathBuf,

        /// Source document name used for the output file
        #[arg(short, long)]
        source: Option<String>,

        /// Page width assumed when the model reports none
        #[arg(long, default_value = "0")]
        page_width: f64,

        /// Page height assumed when the model reports none
        #[arg(long, default_value = "0")]
        page_height: f64,
    },

    /// List registered providers and check their configuration
    Providers,
}

#[derive(Args)]
struct RunArgs {
    /// graph, geometry or measurement
    #[arg(short = 't', long)]
    category: Category,

    /// easy, medium or hard
    #[arg(short, long, default_value = "medium")]
    difficulty: Difficulty,

    /// Generation attempts; defaults to max_regenerations from settings
    #[arg(long)]
    max_retries: Option<u32>,

    /// Stop at the first RETRY and hold the item for review
    #[arg(long)]
    no_retry: bool,

    /// Do not write items and logs
    #[arg(long)]
    no_save: bool,

    /// Render an illustration for accepted items
    #[arg(long)]
    with_image: bool,
}

impl RunArgs {
    fn options(&self, settings: &Settings) -> RunOptions {
        RunOptions {
            difficulty: self.difficulty,
            auto_retry: !self.no_retry,
            max_retries: self.max_retries.unwrap_or(settings.max_regenerations),
            save_results: !self.no_save,
            generate_image: self.with_image,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    init_tracing(&settings.log_level);

    match cli.command {
        Command::Generate { image, run } => generate(&cli.provider, &settings, &image, &run).await,
        Command::Batch { dir, run } => batch(&cli.provider, &settings, &dir, &run).await,
        Command::Extract {
            pages,
            source,
            page_width,
            page_height,
        } => {
            let size = PageSize {
                width: page_width,
                height: page_height,
            };
            extract(&cli.provider, &settings, &pages, source, size).await
        }
        Command::Providers => {
            list_providers();
            Ok(())
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn create_provider(provider_type: &str) -> Result<Arc<dyn VisionProvider>> {
    let registry = ProviderRegistry::with_defaults();
    let config = serde_json::json!({});
    registry
        .validate(provider_type, &config)
        .with_context(|| format!("Provider '{}' is not configured", provider_type))?;
    registry
        .create(provider_type, &config)
        .with_context(|| format!("Failed to create provider '{}'", provider_type))
}

async fn generate(provider_type: &str, settings: &Settings, image: &Path, run: &RunArgs) -> Result<()> {
    let pipeline = Pipeline::from_settings(create_provider(provider_type)?, settings);
    let result = pipeline.run(image, run.category, &run.options(settings)).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        bail!(
            "{}: {}",
            result.status,
            result.error_message.as_deref().unwrap_or("no item accepted")
        );
    }
    Ok(())
}

async fn batch(provider_type: &str, settings: &Settings, dir: &Path, run: &RunArgs) -> Result<()> {
    let pipeline = Pipeline::from_settings(create_provider(provider_type)?, settings);
    let results = pipeline
        .run_batch(dir, run.category, &run.options(settings))
        .await?;

    let stats = statistics(&results);
    let usage = pipeline.usage();
    tracing::info!(
        total = stats.total,
        success = stats.success,
        llm_calls = usage.llm_calls,
        estimated_cost = usage.estimated_cost,
        "Batch finished"
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "statistics": stats,
            "usage": usage,
        }))?
    );
    Ok(())
}

async fn extract(
    provider_type: &str,
    settings: &Settings,
    pages_dir: &Path,
    source: Option<String>,
    page_size: PageSize,
) -> Result<()> {
    let pages = list_images(pages_dir)
        .with_context(|| format!("Failed to list page images in {}", pages_dir.display()))?;
    if pages.is_empty() {
        bail!("No page images found in {}", pages_dir.display());
    }

    let source = source.unwrap_or_else(|| pages_dir.display().to_string());
    let vision = VisionClient::from_settings(
        create_provider(provider_type)?,
        settings,
        Arc::new(UsageTracker::new()),
    );
    let extractor = PageExtractor::new(Arc::new(vision), settings.min_confidence, settings.max_vision_actions)
        .with_page_size(page_size);

    let run = extractor.extract_document(&source, &pages).await;
    let path = ArtifactStore::new(&settings.output_dir)
        .save_extraction(&source, &run)
        .await
        .context("Failed to save extraction")?;

    println!(
        "{} pages processed of {}, {} items, {} passages -> {}",
        run.result.processed_pages,
        run.result.total_pages,
        run.result.items.len(),
        run.result.passages.len(),
        path.display()
    );
    Ok(())
}

fn list_providers() {
    let registry = ProviderRegistry::with_defaults();
    for provider_type in registry.available_types() {
        let Some(factory) = registry.get_factory(provider_type) else {
            continue;
        };
        let status = match factory.validate_config(&serde_json::json!({})) {
            Ok(()) => "ready".to_string(),
            Err(e) => e.to_string(),
        };
        println!("{:<10} {} [{}]", provider_type, factory.description(), status);
    }
}
