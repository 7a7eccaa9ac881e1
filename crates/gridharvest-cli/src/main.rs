mod cli;
mod commands;
mod error;
mod logging;
mod metadata;
mod output;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    logging::initialize_logging();

    let output = commands::run(&cli).await?;

    let mut writer: Box<dyn Write> = match &output.destination {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    output::render(writer.as_mut(), &output, cli.format, cli.pretty)?;

    if let Some(path) = &output.destination {
        info!(path = %path.display(), "wrote output");
    }

    if output.failed_points > 0 {
        eprintln!(
            "warning: {} grid points failed; see `failures` in the JSON output",
            output.failed_points
        );
        return Ok(ExitCode::from(3));
    }

    Ok(ExitCode::SUCCESS)
}
