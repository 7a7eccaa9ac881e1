use std::sync::Arc;

use gridharvest_core::{
    CancellationToken, HarvestReport, HttpClient, ReqwestHttpClient, SchemaMismatch,
};
use tracing::warn;

use super::{env_lookup, load_job, CommandResult, Rows};
use crate::cli::HarvestArgs;
use crate::error::CliError;

pub async fn run(args: &HarvestArgs) -> Result<CommandResult, CliError> {
    let mut job = load_job(&args.job)?;
    if let Some(concurrency) = args.concurrency {
        job.harvest.concurrency = concurrency;
    }
    if let Some(requests_per_second) = args.requests_per_second {
        job.harvest.requests_per_second = Some(requests_per_second);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        job.request.timeout_ms = timeout_ms;
    }

    let grid = job.grid()?;
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let harvester = job.harvester(http, env_lookup)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; finishing in-flight requests");
            on_interrupt.cancel();
        }
    });

    let report = harvester.harvest(&grid, &cancel).await;
    interrupt.abort();

    from_report(&report?)
}

fn from_report(report: &HarvestReport) -> Result<CommandResult, CliError> {
    let mut warnings = report
        .schema_mismatches
        .iter()
        .map(describe_mismatch)
        .collect::<Vec<_>>();
    if report.stats.cancelled > 0 {
        warnings.push(format!(
            "harvest cancelled; {} points were not fetched",
            report.stats.cancelled
        ));
    }

    let rows = Rows {
        columns: report.table.columns().to_vec(),
        rows: report.table.rows().to_vec(),
    };

    Ok(CommandResult::ok(serde_json::to_value(report)?, rows)
        .with_warnings(warnings)
        .with_failed_points(report.failures.len()))
}

fn describe_mismatch(mismatch: &SchemaMismatch) -> String {
    let mut parts = Vec::new();
    if !mismatch.added.is_empty() {
        parts.push(format!("added {}", mismatch.added.join(",")));
    }
    if !mismatch.missing.is_empty() {
        parts.push(format!("missing {}", mismatch.missing.join(",")));
    }
    format!("schema drift at [{}]: {}", mismatch.point, parts.join("; "))
}
