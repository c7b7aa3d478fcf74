//! Flipbook CLI binary.
//!
//! Generates flipbooks offline with the placeholder capabilities:
//! - `run` compiles one flipbook from an image prompt and a story prompt
//! - `batch` compiles templated variations with bounded parallelism

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use flipbook::batch::{BatchRequest, BatchRunner, PromptEnhancement, PromptTemplate};
use flipbook::cache::{ArtifactCache, CachePolicy};
use flipbook::config::FlipbookConfig;
use flipbook::core::{GenerationParameters, RunState};
use flipbook::observability::init_tracing;
use flipbook::pipeline::{PipelineOrchestrator, RunRequest};
use flipbook::stages::{PlaceholderImageCapability, PlaceholderStoryCapability};
use flipbook::storage::{ArtifactStore, FileSystemArtifactStore, InMemoryArtifactStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Flipbook - offline image and story pipeline
#[derive(Parser, Debug)]
#[command(name = "flipbook")]
#[command(about = "Compile interactive image + story flipbooks", long_about = None)]
#[command(version)]
struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Persist artifacts and documents under this directory
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a single flipbook
    Run {
        /// Prompt for the illustration
        #[arg(long)]
        image_prompt: String,

        /// Prompt for the story
        #[arg(long)]
        story_prompt: String,

        #[command(flatten)]
        params: ParamArgs,

        /// Write the HTML document here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Compile templated variations of one flipbook
    Batch {
        /// Image prompt template
        #[arg(long)]
        image_template: String,

        /// Story prompt template
        #[arg(long)]
        story_template: String,

        /// Number of runs
        #[arg(long, default_value = "3")]
        count: usize,

        /// Maximum concurrent runs (defaults to the configured value)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Append the default quality suffix and negative prompt
        #[arg(long)]
        enhance: bool,

        #[command(flatten)]
        params: ParamArgs,

        /// Directory for the compiled documents
        #[arg(long, default_value = "flipbooks")]
        out_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ParamArgs {
    /// Guidance scale (1.0 to 20.0)
    #[arg(long)]
    guidance_scale: Option<f64>,

    /// Adaptation weight (0.0 to 1.0)
    #[arg(long)]
    adaptation_weight: Option<f64>,

    /// Maximum story length in words
    #[arg(long)]
    max_units: Option<u32>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Ignore cached artifacts
    #[arg(long)]
    force_fresh: bool,
}

impl ParamArgs {
    fn parameters(&self, prompt: &str) -> Result<GenerationParameters> {
        let mut builder = GenerationParameters::builder(prompt);
        if let Some(value) = self.guidance_scale {
            builder = builder.guidance_scale(value);
        }
        if let Some(value) = self.adaptation_weight {
            builder = builder.adaptation_weight(value);
        }
        if let Some(value) = self.max_units {
            builder = builder.max_output_units(value);
        }
        if let Some(value) = self.seed {
            builder = builder.seed(value);
        }
        Ok(builder.build()?)
    }

    const fn cache_policy(&self) -> CachePolicy {
        if self.force_fresh {
            CachePolicy::ForceFresh
        } else {
            CachePolicy::UseCache
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = FlipbookConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_tracing(&config.logging)?;

    let store: Arc<dyn ArtifactStore> = match &cli.store_dir {
        Some(dir) => Arc::new(
            FileSystemArtifactStore::new(dir)
                .with_context(|| format!("opening store at {}", dir.display()))?,
        ),
        None => Arc::new(InMemoryArtifactStore::new()),
    };
    let orchestrator = PipelineOrchestrator::from_config(
        &config,
        Arc::new(PlaceholderImageCapability::new()),
        Arc::new(PlaceholderStoryCapability::new()),
    )?
    .cache(ArtifactCache::with_store(config.cache.clone(), Arc::clone(&store)))
    .store(store)
    .build();

    match cli.command {
        Commands::Run {
            image_prompt,
            story_prompt,
            params,
            out,
        } => {
            let base = params.parameters(&image_prompt)?;
            let request = RunRequest::new(image_prompt, story_prompt, &base)?
                .with_cache_policy(params.cache_policy());
            run_single(&orchestrator, request, out.as_deref()).await
        }
        Commands::Batch {
            image_template,
            story_template,
            count,
            parallelism,
            enhance,
            params,
            out_dir,
        } => {
            let mut batch_config = config.batch.clone();
            if let Some(parallelism) = parallelism {
                batch_config = batch_config.with_parallelism(parallelism);
            }
            let mut request = BatchRequest::new(
                PromptTemplate::new(image_template.as_str(), story_template.as_str()),
                params.parameters(&image_template)?,
                count,
            )?
            .with_cache_policy(params.cache_policy());
            if enhance {
                request = request.with_enhancement(PromptEnhancement::default());
            }
            run_batch(BatchRunner::new(orchestrator, batch_config), request, &out_dir).await
        }
    }
}

async fn run_single(
    orchestrator: &PipelineOrchestrator,
    request: RunRequest,
    out: Option<&Path>,
) -> Result<()> {
    let run = orchestrator.run(request).await;
    eprintln!("{}", serde_json::to_string_pretty(&run.summary())?);

    match (run.state(), run.document()) {
        (RunState::Done, Some(document)) => {
            match out {
                Some(path) => {
                    tokio::fs::write(path, document.as_bytes())
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "Flipbook written");
                }
                None => println!("{}", document.html),
            }
            Ok(())
        }
        (state, _) => match run.failure() {
            Some(failure) => bail!("run {state}: {failure}"),
            None => bail!("run {state}"),
        },
    }
}

async fn run_batch(runner: BatchRunner, request: BatchRequest, out_dir: &Path) -> Result<()> {
    let report = runner.run(request).await;

    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("creating {}", out_dir.display()))?;
    for entry in &report.entries {
        let Some(document) = entry.run.as_ref().and_then(|run| run.document()) else {
            continue;
        };
        let path = out_dir.join(format!("flipbook_{:03}.html", entry.index));
        tokio::fs::write(&path, document.as_bytes())
            .await
            .with_context(|| format!("writing {}", path.display()))?;
    }
    println!("{}", serde_json::to_string_pretty(&report.summary())?);

    if report.failed_count() > 0 {
        bail!(
            "{} of {} runs failed",
            report.failed_count(),
            report.len()
        );
    }
    Ok(())
}
