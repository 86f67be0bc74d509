use anyhow::{Context, Result};
use clap::Parser;
use classranker::{
    install_and_load, load_project, DeviceSpec, InferenceRunner, ModelProvisioner, Settings,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Score RELION 2D class averages with the class ranker model
#[derive(Debug, Parser)]
#[command(name = "classranker", version)]
#[command(about = "Install the class ranker model and score a RELION project", long_about = None)]
struct Cli {
    /// Directory containing features.npy and images.npy; omit to only install the model
    #[arg(value_name = "PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    /// Model version (defaults to the configured default, v1.0)
    #[arg(short = 'm', long = "model-name", alias = "model_name", value_name = "NAME")]
    model_name: Option<String>,

    /// Compute device: cpu, cuda[:N] or metal[:N]
    #[arg(long, value_name = "DEVICE")]
    device: Option<String>,

    /// Samples per forward pass (0 scores everything at once)
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,

    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose || cli.project_dir.is_none());

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "classranker=info" } else { "classranker=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // stdout is reserved for scores
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::load().context("Failed to load settings")?;
    let model_name = cli
        .model_name
        .unwrap_or_else(|| settings.default_model.clone());

    // Checked before anything touches the cache root
    let catalog = settings.catalog();
    if let Err(e) = catalog.require(&model_name) {
        warn!("{e}");
        println!("Model name not found!");
        return Ok(ExitCode::from(1));
    }

    let device_spec: DeviceSpec = match &cli.device {
        Some(device) => device.parse()?,
        None => settings.device()?,
    };
    let device = device_spec.open()?;

    let cache_root = settings.cache_root()?;
    let provisioner = ModelProvisioner::with_http(catalog, cache_root)?;

    let Some(loaded) = install_and_load(&provisioner, &model_name, &device)
        .with_context(|| format!("Failed to install and load model {model_name}"))?
    else {
        println!("Model name not found!");
        return Ok(ExitCode::from(1));
    };

    let Some(project_dir) = cli.project_dir else {
        println!("No project directory was specified... exiting!");
        return Ok(ExitCode::SUCCESS);
    };

    let arrays = load_project(&project_dir)
        .with_context(|| format!("Failed to read inputs from {}", project_dir.display()))?;

    let runner = InferenceRunner::new(cli.batch_size.unwrap_or(settings.batch_size));
    let scores = runner.score(&loaded.model, arrays.features.view(), arrays.images.view())?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{scores}")?;
    stdout.flush()?;

    Ok(ExitCode::SUCCESS)
}
