use crate::{
    config::{Config, expand_env},
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use chrono::Utc;
use clap::Parser;
use commands::Commands;
use engine_core::state::{StateStore, models::StepRunId, sled_store::SledStateStore};
use engine_runtime::{error::EngineError, runner::StepRunner};
use model::run::RunStatus;
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod error;
mod output;
mod shutdown;
mod wiring;

#[derive(Parser)]
#[command(
    name = "hopper",
    version = "0.1.0",
    about = "Chunk-oriented batch processing"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    // Initialize logger; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let code = match dispatch(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "Command failed");
            ExitCode::GeneralError
        }
    };

    std::process::exit(code.as_i32());
}

async fn dispatch(command: Commands) -> Result<ExitCode, CliError> {
    match command {
        Commands::Run {
            config,
            step,
            token,
            force,
        } => run_step(&config, &step, token, force).await,
        Commands::Status {
            config,
            step,
            token,
            json,
        } => show_status(config.as_deref(), &step, token.as_deref(), json).await,
        Commands::Steps { config } => list_steps(&config),
    }
}

async fn run_step(
    config_path: &str,
    step: &str,
    token: Option<String>,
    force: bool,
) -> Result<ExitCode, CliError> {
    let config = Config::from_file(config_path)?;
    let registry = Arc::new(wiring::build_registry(&config)?);
    let store = open_state_store(config.state_dir.as_deref())?;

    // Without an explicit token every invocation is a distinct run.
    let token = token.unwrap_or_else(|| Utc::now().timestamp_millis().to_string());

    let cancel = CancellationToken::new();
    let shutdown = ShutdownCoordinator::new(cancel.clone());
    shutdown.register_handlers();

    let runner = StepRunner::new(registry, store).with_cancel(cancel);

    match runner.run(step, &token, force).await {
        Ok(outcome) => {
            output::print_outcome(step, &token, &outcome);
            Ok(match outcome.status {
                RunStatus::Completed => ExitCode::Success,
                RunStatus::Stopped => ExitCode::ShutdownRequested,
                RunStatus::Failed => ExitCode::GeneralError,
            })
        }
        Err(EngineError::AlreadyCompleted { step, token }) => {
            eprintln!(
                "Step '{step}' already completed for token '{token}'. \
                 Pass --force to reprocess, or use a fresh --token."
            );
            Ok(ExitCode::GeneralError)
        }
        Err(err) => Err(err.into()),
    }
}

async fn show_status(
    config_path: Option<&str>,
    step: &str,
    token: Option<&str>,
    as_json: bool,
) -> Result<ExitCode, CliError> {
    let state_dir = match config_path {
        Some(path) => Config::from_file(path)?.state_dir,
        None => None,
    };
    let store = open_state_store(state_dir.as_deref())?;

    match token {
        Some(token) => {
            let id = StepRunId::new(step, token);
            let record = store.load_run(&id).await?;
            let checkpoint = store.load_checkpoint(&id).await?;
            if as_json {
                output::print_run_detail_json(record.as_ref(), checkpoint.as_ref())?;
            } else {
                output::print_run_detail(step, token, record.as_ref(), checkpoint.as_ref());
            }
        }
        None => {
            let runs = store.list_runs(step).await?;
            if as_json {
                output::print_runs_json(&runs)?;
            } else {
                output::print_runs(step, &runs);
            }
        }
    }

    Ok(ExitCode::Success)
}

fn list_steps(config_path: &str) -> Result<ExitCode, CliError> {
    let config = Config::from_file(config_path)?;
    if config.step.is_empty() {
        println!("No steps defined in '{config_path}'.");
        return Ok(ExitCode::Success);
    }

    println!(
        "{:<24} {:>10} {:<12} {:<12} {}",
        "STEP", "CHUNK", "READER", "TRANSFORM", "WRITER"
    );
    for (name, step) in &config.step {
        let transform = step
            .transform
            .as_ref()
            .map(|t| t.kind_name())
            .unwrap_or("identity");
        println!(
            "{:<24} {:>10} {:<12} {:<12} {}",
            name,
            step.chunk_size,
            step.reader.kind_name(),
            transform,
            step.writer.kind_name(),
        );
    }

    Ok(ExitCode::Success)
}

fn open_state_store(state_dir: Option<&str>) -> Result<Arc<dyn StateStore>, CliError> {
    let path = match state_dir {
        Some(dir) => PathBuf::from(expand_env(dir)?),
        None => dirs::home_dir()
            .ok_or_else(|| {
                CliError::Config(
                    "Could not determine a home directory; set state_dir in the config file"
                        .to_string(),
                )
            })?
            .join(".hopper/state"),
    };
    let store = SledStateStore::open(&path)?;
    Ok(Arc::new(store))
}
