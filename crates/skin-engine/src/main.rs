//! Skin Risk - command line entry point

use std::path::PathBuf;

use anyhow::{bail, Context};
use camera_capture::{CameraConfig, ReplaySource};
use capture_session::CameraDevice;
use clap::{Args, Parser, Subcommand};
use risk_scoring::QuestionnaireInput;
use skin_engine::{init_logging, Engine, EngineConfig};
use skin_features::SAMPLES_PER_SESSION;
use tracing::info;

#[derive(Parser)]
#[command(name = "skin-risk", version, about = "Skin analysis and beauty treatment risk scoring")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score a questionnaire, optionally with a three-image skin analysis
    Assess(AssessArgs),
}

#[derive(Args)]
struct AssessArgs {
    /// Questionnaire answers as JSON
    #[arg(long)]
    questionnaire: PathBuf,

    /// User the assessment is stored for
    #[arg(long, default_value = "local")]
    user: String,

    /// Three face images replayed as the capture session
    #[arg(long, num_args = 1..)]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_logging(&config.logging)?;
    info!("=== Skin Risk v{} ===", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Assess(args) => assess(&config, args).await,
    }
}

async fn assess(config: &EngineConfig, args: AssessArgs) -> anyhow::Result<()> {
    if !args.images.is_empty() && args.images.len() != SAMPLES_PER_SESSION {
        bail!(
            "expected {} images, got {}",
            SAMPLES_PER_SESSION,
            args.images.len()
        );
    }

    let raw = tokio::fs::read_to_string(&args.questionnaire)
        .await
        .with_context(|| format!("reading {}", args.questionnaire.display()))?;
    let questionnaire: QuestionnaireInput =
        serde_json::from_str(&raw).context("parsing questionnaire")?;

    let engine = Engine::from_config(config);

    let metrics = if args.images.is_empty() {
        None
    } else {
        let camera = CameraDevice::new(ReplaySource::new(
            &args.images,
            CameraConfig { mirrored: false },
        ));
        Some(engine.analyze(&camera).await.context("analyzing images")?)
    };

    let stored = engine.assess(&args.user, &questionnaire, metrics.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&stored)?);

    engine.shutdown().await;
    Ok(())
}
