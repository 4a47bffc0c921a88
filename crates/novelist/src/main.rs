//! Novelist command-line entry point.

use clap::Parser;
use novelist::cli::{
    Cli, CommandOutcome, Commands, handle_retry_command, handle_run_command,
    handle_status_command, init_tracing, load_config,
};
use std::process::ExitCode;

async fn dispatch(cli: Cli) -> anyhow::Result<CommandOutcome> {
    let config = load_config(cli.config.as_deref(), cli.state_dir.as_deref())?;

    match cli.command {
        Commands::Run(args) => handle_run_command(args, config).await,
        Commands::Status { run_id } => {
            handle_status_command(&run_id, &config).await?;
            Ok(CommandOutcome::Success)
        }
        Commands::Retry { run_id, concept } => {
            handle_retry_command(&run_id, &concept, config).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before clap reads env-backed arguments
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match dispatch(cli).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
