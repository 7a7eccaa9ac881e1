use gridharvest_core::ParameterGrid;
use serde_json::{json, Value};

use super::{load_job, CommandResult, Rows};
use crate::cli::JobArgs;
use crate::error::CliError;

pub fn run(args: &JobArgs) -> Result<CommandResult, CliError> {
    let job = load_job(args)?;
    let grid = job.grid()?;
    job.request_spec()?.validate(&grid)?;

    let data = json!({
        "size": grid.len(),
        "axes": grid
            .axes()
            .iter()
            .map(|axis| json!({"name": axis.name(), "values": axis.values()}))
            .collect::<Vec<_>>(),
        "points": grid.iter().collect::<Vec<_>>(),
    });

    Ok(CommandResult::ok(data, rows(&grid)))
}

fn rows(grid: &ParameterGrid) -> Rows {
    let mut columns = vec![String::from("index")];
    columns.extend(grid.axes().iter().map(|axis| axis.name().to_string()));

    let rows = grid
        .iter()
        .map(|point| {
            let mut row = vec![Value::from(point.index())];
            row.extend(point.iter().map(|(_, value)| value.to_json()));
            row
        })
        .collect();

    Rows { columns, rows }
}
