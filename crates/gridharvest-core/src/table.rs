//! Concatenation of per-point records into one table with a unioned schema.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::extract::Record;
use crate::grid::ParameterPoint;
use crate::harvest::FetchResult;

/// A point whose records did not match the columns seen so far.
///
/// Informational only: the table resolves it by filling nulls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaMismatch {
    pub point: ParameterPoint,
    /// Columns first introduced by this point.
    pub added: Vec<String>,
    /// Known columns absent from at least one of this point's records.
    pub missing: Vec<String>,
}

/// Rows from every successful point, in grid order.
///
/// `columns` is the union of all observed fields. A point's new fields are
/// appended after the known ones, sorted by name since records keep their
/// keys sorted. Each row has exactly one value per column, `null` where the
/// record lacked the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HarvestTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl HarvestTable {
    /// Concatenates the records of all non-errored results in the given order.
    pub fn concatenate(results: &[FetchResult]) -> (Self, Vec<SchemaMismatch>) {
        let mut builder = TableBuilder::default();
        let mut mismatches = Vec::new();

        for result in results.iter().filter(|result| result.error.is_none()) {
            if let Some(mismatch) = builder.push_point(&result.point, &result.records) {
                mismatches.push(mismatch);
            }
        }

        (builder.finish(), mismatches)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of `name`, one per row.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let position = self.columns.iter().position(|column| column == name)?;
        Some(self.rows.iter().map(|row| &row[position]).collect())
    }

    /// Rows as JSON objects carrying every column, nulls included.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Map<_, _>>()
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct TableBuilder {
    columns: Vec<String>,
    known: HashSet<String>,
    records: Vec<Record>,
}

impl TableBuilder {
    fn push_point(&mut self, point: &ParameterPoint, records: &[Record]) -> Option<SchemaMismatch> {
        let mut added = Vec::new();
        let mut missing = BTreeSet::new();

        for record in records {
            let had_rows = !self.records.is_empty();

            for column in &self.columns {
                if !record.contains_key(column) {
                    missing.insert(column.clone());
                }
            }

            for field in record.keys() {
                if self.known.insert(field.clone()) {
                    self.columns.push(field.clone());
                    if had_rows {
                        added.push(field.clone());
                    }
                }
            }

            self.records.push(record.clone());
        }

        if added.is_empty() && missing.is_empty() {
            return None;
        }

        Some(SchemaMismatch {
            point: point.clone(),
            added,
            missing: missing.into_iter().collect(),
        })
    }

    fn finish(self) -> HarvestTable {
        let rows = self
            .records
            .iter()
            .map(|record| {
                self.columns
                    .iter()
                    .map(|column| record.get(column).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        HarvestTable {
            columns: self.columns,
            rows,
        }
    }
}
