mod cli;
mod demo;
mod error;
mod output;
mod runner;

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run(cli: &Cli) -> Result<(), CliError> {
    init_tracing(cli.log_level.as_deref())?;
    runner::run(cli).await
}

/// Logs go to stderr so `--format json` output stays machine-readable.
fn init_tracing(log_level: Option<&str>) -> Result<(), CliError> {
    let filter = match log_level {
        Some(directive) => EnvFilter::try_new(directive).map_err(|err| CliError::LogFilter {
            filter: directive.to_owned(),
            message: err.to_string(),
        })?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}
