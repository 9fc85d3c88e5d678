use clap::Parser;
use std::{path::PathBuf, process::ExitCode};
use tomato_diagnosis::{
    batch::{run_batch, BatchStatus},
    config::{self, Validatable},
    DiagnosisService,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Diagnose tomato leaf photos from the command line.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Image files (jpg, jpeg or png).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Model file, overriding the configured one.
    #[arg(long)]
    model: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match config::get_configuration() {
        Ok(settings) => Some(settings),
        Err(e) if cli.model.is_some() => {
            eprintln!("Ignoring configuration ({e}), using --model");
            None
        }
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_level = settings
        .as_ref()
        .map(|s| format!("{},ort=info", s.log_level))
        .unwrap_or_else(|| "info,ort=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let (model, admission) = match (settings, cli.model) {
        (Some(settings), None) => (settings.model, settings.admission),
        (Some(settings), Some(path)) => {
            let mut model = config::ModelConfig::from_path(path);
            model.min_probability = settings.model.min_probability;
            (model, settings.admission)
        }
        (None, Some(path)) => (config::ModelConfig::from_path(path), Default::default()),
        (None, None) => return ExitCode::FAILURE,
    };

    let service = DiagnosisService::from_config(&model, &admission);
    let stdout = std::io::stdout();
    match run_batch(&service, &cli.images, &mut stdout.lock()) {
        Ok(BatchStatus::ModelUnavailable) => {
            eprintln!("Model not available: {:?}", model.get_path());
            ExitCode::FAILURE
        }
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("Failed to write results: {e}");
            ExitCode::FAILURE
        }
    }
}
