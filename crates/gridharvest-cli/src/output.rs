use std::io::Write;

use serde_json::{Map, Value};

use crate::cli::OutputFormat;
use crate::commands::{CommandOutput, Rows};
use crate::error::CliError;

pub fn render(
    writer: &mut dyn Write,
    output: &CommandOutput,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(&output.envelope)?
            } else {
                serde_json::to_string(&output.envelope)?
            };
            writeln!(writer, "{payload}")?;
        }
        OutputFormat::Ndjson => render_ndjson(writer, &output.rows)?,
        OutputFormat::Table => {
            render_table(writer, &output.rows)?;
            for warning in &output.envelope.meta.warnings {
                writeln!(writer, "warning: {warning}")?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

fn render_ndjson(writer: &mut dyn Write, rows: &Rows) -> Result<(), CliError> {
    for row in &rows.rows {
        let object = rows
            .columns
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .collect::<Map<_, _>>();
        writeln!(writer, "{}", serde_json::to_string(&object)?)?;
    }
    Ok(())
}

fn render_table(writer: &mut dyn Write, rows: &Rows) -> Result<(), CliError> {
    let cells = rows
        .rows
        .iter()
        .map(|row| row.iter().map(cell).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let widths = rows
        .columns
        .iter()
        .enumerate()
        .map(|(position, column)| {
            cells
                .iter()
                .filter_map(|row| row.get(position))
                .map(|text| text.chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect::<Vec<_>>();

    writeln!(writer, "{}", line(rows.columns.iter().map(String::as_str), &widths))?;
    writeln!(
        writer,
        "{}",
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("-+-")
    )?;
    for row in &cells {
        writeln!(writer, "{}", line(row.iter().map(String::as_str), &widths))?;
    }
    writeln!(writer, "({} rows)", cells.len())?;
    Ok(())
}

fn line<'a>(values: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    values
        .zip(widths)
        .map(|(value, &width)| format!("{value:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
