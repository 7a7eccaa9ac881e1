//! CLI argument definitions for gridharvest.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest` | Fetch every grid point of a job and print the table |
//! | `grid` | List the points a job would fetch, without network access |
//! | `token` | Check that the job's credentials can obtain a bearer token |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, ndjson, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! # Harvest a whole season of weekly stats
//! gridharvest harvest --job weekly.toml --pretty
//!
//! # Narrow the grid from the command line
//! gridharvest harvest --job weekly.toml --axis week=1..4 --axis season=2023 --format table
//!
//! # Preview the grid
//! gridharvest grid --job weekly.toml --format ndjson
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use gridharvest_core::ParameterAxis;

/// Authenticated bulk harvesting of parameterized JSON endpoints.
#[derive(Debug, Parser)]
#[command(
    name = "gridharvest",
    author,
    version,
    about = "Harvest a parameter grid from an authenticated JSON API",
    long_about = "gridharvest exchanges client credentials for a bearer token, expands a \
parameter grid (for example week x season), fetches one request per point and \
concatenates the records into a single table.\n\
\n\
Credentials are read from the environment variables named in the job file \
(default GRIDHARVEST_CLIENT_ID and GRIDHARVEST_CLIENT_SECRET). Set RUST_LOG to \
control log verbosity on stderr."
)]
pub struct Cli {
    /// Output format for results.
    ///
    /// - json: Single JSON object (default)
    /// - ndjson: One JSON object per row
    /// - table: ASCII table format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format for terminal display.
    Table,
    /// Single JSON object output.
    Json,
    /// Newline-delimited JSON (one object per row).
    Ndjson,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every point of the job's grid and print the concatenated table.
    ///
    /// Exits with code 3 when some points failed; their parameters are
    /// listed under `failures`.
    ///
    /// # Examples
    ///
    ///   gridharvest harvest --job weekly.toml
    ///   gridharvest harvest --job weekly.toml --concurrency 8 --output stats.json
    Harvest(HarvestArgs),

    /// List the grid points a job would fetch.
    Grid(JobArgs),

    /// Acquire a bearer token and print its metadata (never the token itself).
    Token(JobArgs),
}

/// Job file selection shared by every command.
#[derive(Debug, Clone, Args)]
pub struct JobArgs {
    /// Path to the TOML job file.
    #[arg(long, short = 'j')]
    pub job: PathBuf,

    /// Replace (or add) a grid axis: `name=start..end` or `name=v1,v2`.
    #[arg(long = "axis", value_name = "SPEC")]
    pub axes: Vec<ParameterAxis>,
}

/// Arguments for the `harvest` command.
#[derive(Debug, Clone, Args)]
pub struct HarvestArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Maximum number of requests in flight (overrides the job file).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Cap on requests per second (overrides the job file).
    #[arg(long)]
    pub requests_per_second: Option<u32>,

    /// Per-request timeout in milliseconds (overrides the job file).
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Write the output to this file instead of stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}
