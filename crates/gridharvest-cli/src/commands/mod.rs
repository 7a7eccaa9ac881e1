mod grid;
mod harvest;
mod token;

use std::path::PathBuf;
use std::time::Instant;

use gridharvest_core::JobConfig;
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command, JobArgs};
use crate::error::CliError;
use crate::metadata::{Envelope, Metadata};

/// Row-oriented view of a command result, used by the ndjson and table formats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug)]
pub struct CommandResult {
    pub data: Value,
    pub rows: Rows,
    pub warnings: Vec<String>,
    /// Grid points that produced no records.
    pub failed_points: usize,
}

impl CommandResult {
    pub fn ok(data: Value, rows: Rows) -> Self {
        Self {
            data,
            rows,
            warnings: Vec::new(),
            failed_points: 0,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_failed_points(mut self, failed_points: usize) -> Self {
        self.failed_points = failed_points;
        self
    }
}

/// Everything `main` needs to print a command result.
pub struct CommandOutput {
    pub envelope: Envelope,
    pub rows: Rows,
    pub failed_points: usize,
    pub destination: Option<PathBuf>,
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    let started = Instant::now();

    let (command, destination, result) = match &cli.command {
        Command::Harvest(args) => ("harvest", args.output.clone(), harvest::run(args).await?),
        Command::Grid(args) => ("grid", None, grid::run(args)?),
        Command::Token(args) => ("token", None, token::run(args).await?),
    };

    let CommandResult {
        data,
        rows,
        warnings,
        failed_points,
    } = result;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut meta = Metadata::new(command, latency_ms);
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok(CommandOutput {
        envelope: Envelope { meta, data },
        rows,
        failed_points,
        destination,
    })
}

/// Loads the job file and applies `--axis` overrides.
fn load_job(args: &JobArgs) -> Result<JobConfig, CliError> {
    let mut job = JobConfig::from_path(&args.job)?;
    debug!(path = %args.job.display(), axes = job.axes.len(), "loaded job file");

    for axis in &args.axes {
        debug!(axis = axis.name(), values = axis.len(), "overriding axis");
        job.override_axis(axis);
    }
    Ok(job)
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
