//! postforge CLI: brief in, social image batch out.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use postforge::config::{AppConfig, ConfigOverrides, ImageSize};
use postforge::gemini::{GeminiClient, RenderSettings, TextModel as _};
use postforge::orchestrator::{BatchOrchestrator, BatchRun};
use postforge::regen::{self, RegenOutcome};
use postforge::renderer::ImageRenderer;
use postforge::session::SessionStore;
use postforge::synthesizer::PromptSynthesizer;

#[derive(Parser, Debug)]
#[command(author, version, about = "Brief-to-asset social image pipeline", long_about = None)]
struct Cli {
    /// Path to a TOML config file (default: postforge.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: CliOverrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct CliOverrides {
    /// Output directory for images, logs and the session snapshot.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Text-generation model id.
    #[arg(long, global = true)]
    text_model: Option<String>,

    /// Image-generation model id.
    #[arg(long, global = true)]
    image_model: Option<String>,

    /// Aspect ratio forwarded to the image model (e.g. 1:1, 16:9).
    #[arg(long, global = true)]
    aspect_ratio: Option<String>,

    /// Resolution tier: 1K, 2K or 4K.
    #[arg(long, global = true)]
    image_size: Option<ImageSize>,
}

impl From<CliOverrides> for ConfigOverrides {
    fn from(cli: CliOverrides) -> Self {
        Self {
            output_dir: cli.output_dir,
            text_model: cli.text_model,
            image_model: cli.image_model,
            aspect_ratio: cli.aspect_ratio,
            image_size: cli.image_size,
            ..Self::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Draft a post plan from a brief and render every prompt option.
    Generate {
        /// Brief file; `-` reads stdin.
        #[arg(long)]
        brief: PathBuf,

        /// Brand guidelines file (default: brand_guidelines.txt when present).
        #[arg(long)]
        guidelines: Option<PathBuf>,

        /// Skip the archive bundle at the end of the run.
        #[arg(long, default_value_t = false)]
        no_archive: bool,
    },
    /// Re-render one option with an appended correction.
    Regenerate {
        /// Post id from the plan.
        #[arg(long)]
        post: u32,

        /// 1-based option number within the post.
        #[arg(long)]
        option: usize,

        /// Correction instructions appended to the original prompt.
        #[arg(long)]
        correction: String,
    },
    /// Bundle the output directory into a ZIP.
    Archive,
    /// List model identifiers visible to the configured credential.
    Models,
    /// Discard the saved session snapshot.
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), cli.overrides.clone().into())?;

    match cli.command {
        Command::Generate {
            brief,
            guidelines,
            no_archive,
        } => run_generate(&config, &brief, guidelines.as_deref(), no_archive).await,
        Command::Regenerate {
            post,
            option,
            correction,
        } => run_regenerate(&config, post, option, &correction).await,
        Command::Archive => {
            let path = SessionStore::new(&config.output_dir).bundle_archive()?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Models => run_models(&config).await,
        Command::Clean => {
            SessionStore::new(&config.output_dir).clear_snapshot()?;
            info!("session snapshot removed");
            Ok(())
        }
    }
}

async fn run_generate(
    config: &AppConfig,
    brief_path: &Path,
    guidelines_path: Option<&Path>,
    no_archive: bool,
) -> Result<()> {
    let brief = read_brief(brief_path)?;
    if brief.trim().is_empty() {
        bail!("brief is empty");
    }
    let guidelines = read_guidelines(guidelines_path.or(config.guidelines_path.as_deref()))?;

    let client = GeminiClient::new(config)?;
    info!(
        text_model = %config.text_model,
        image_model = %config.image_model,
        output_dir = %config.output_dir.display(),
        "postforge starting"
    );

    let synthesizer = PromptSynthesizer::new(&client);
    let plan = synthesizer.synthesize(&brief, &guidelines).await?;

    let mut run = BatchRun::from_plan(plan, &brief);
    let store = SessionStore::new(&config.output_dir);
    store.save_snapshot(&run)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("stop requested; the in-flight render will finish, nothing new starts");
            signal_token.cancel();
        }
    });

    let renderer = ImageRenderer::new(
        &client,
        RenderSettings {
            aspect_ratio: config.aspect_ratio.clone(),
            image_size: config.image_size,
        },
    );
    let orchestrator = BatchOrchestrator::new(&renderer, &config.output_dir);
    let report = orchestrator.run(&mut run, &cancel).await?;

    store.save_snapshot(&run)?;
    store.append_log(&report.entries)?;
    if !no_archive && report.generated > 0 {
        store.bundle_archive()?;
    }

    info!(
        generated = report.generated,
        failed = report.failed,
        attempted = report.attempted,
        total = report.total,
        stopped = report.stopped,
        "batch finished"
    );
    Ok(())
}

async fn run_regenerate(
    config: &AppConfig,
    post: u32,
    option: usize,
    correction: &str,
) -> Result<()> {
    let store = SessionStore::new(&config.output_dir);
    let mut run = store.load_snapshot()?;

    let client = GeminiClient::new(config)?;
    let renderer = ImageRenderer::new(
        &client,
        RenderSettings {
            aspect_ratio: config.aspect_ratio.clone(),
            image_size: config.image_size,
        },
    );

    match regen::regenerate(&renderer, &config.output_dir, &mut run, post, option, correction)
        .await?
    {
        RegenOutcome::Replaced { entry } => {
            store.append_log(std::slice::from_ref(&entry))?;
            store.save_snapshot(&run)?;
            info!(post, option, file = %entry.file_path, "option regenerated");
            Ok(())
        }
        RegenOutcome::Failed { message } => {
            bail!("regeneration failed, previous image kept: {message}")
        }
    }
}

async fn run_models(config: &AppConfig) -> Result<()> {
    let client = GeminiClient::new(config)?;
    let models = client.list_models().await?;
    for name in models {
        println!("{name}");
    }
    Ok(())
}

fn read_brief(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading brief from stdin")?;
        Ok(buf)
    } else {
        fs::read_to_string(path).with_context(|| format!("reading brief {}", path.display()))
    }
}

fn read_guidelines(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading guidelines {}", path.display())),
        None => Ok(String::new()),
    }
}
