//! Response shape validation and record normalization.
//!
//! A response must be a JSON object whose records field is an array of
//! objects. Anything else is a parse error for that point; untyped access
//! never leaks past this module.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::grid::ParameterPoint;
use crate::{PointError, ValidationError};

/// One normalized row before it is placed in a [`crate::HarvestTable`].
pub type Record = Map<String, Value>;

/// How records are pulled out of a response and reshaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Extraction {
    /// Top-level key holding the records, or a JSON pointer such as `/data/stats`.
    pub records: String,
    /// Fields removed from every record.
    #[serde(default)]
    pub drop_fields: BTreeSet<String>,
    /// Record fields renamed as `from -> to`.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    /// Extra top-level response fields copied onto every record.
    #[serde(default)]
    pub propagate: Vec<String>,
}

impl Extraction {
    pub fn new(records: impl Into<String>) -> Result<Self, ValidationError> {
        let extraction = Self {
            records: records.into(),
            drop_fields: BTreeSet::new(),
            rename: BTreeMap::new(),
            propagate: Vec::new(),
        };
        extraction.validate()?;
        Ok(extraction)
    }

    pub fn drop_field(mut self, field: impl Into<String>) -> Self {
        self.drop_fields.insert(field.into());
        self
    }

    pub fn rename_field(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.insert(from.into(), to.into());
        self
    }

    pub fn propagate_field(mut self, field: impl Into<String>) -> Self {
        self.propagate.push(field.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let records = self.records.trim();
        if records.is_empty() || records == "/" {
            return Err(ValidationError::EmptyRecordsKey);
        }
        Ok(())
    }

    /// Parses `body` and returns the normalized records for `point`.
    ///
    /// Each record gets one field per axis. A scalar echoed at the top level
    /// of the response under the axis name wins over the requested value.
    pub fn extract(&self, body: &str, point: &ParameterPoint) -> Result<Vec<Record>, PointError> {
        let document: Value = serde_json::from_str(body)
            .map_err(|error| PointError::parse(format!("response is not valid JSON: {error}")))?;

        let Value::Object(top) = &document else {
            return Err(PointError::parse("response top level is not a JSON object"));
        };

        let records = if self.records.starts_with('/') {
            document.pointer(&self.records)
        } else {
            top.get(&self.records)
        }
        .ok_or_else(|| PointError::parse(format!("response has no '{}' field", self.records)))?;

        let Value::Array(items) = records else {
            return Err(PointError::parse(format!(
                "'{}' is not an array",
                self.records
            )));
        };

        let tags = self.tags(top, point);

        items
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(fields) => Ok(self.normalize(fields.clone(), &tags)),
                _ => Err(PointError::parse(format!(
                    "'{}'[{index}] is not an object",
                    self.records
                ))),
            })
            .collect()
    }

    fn tags(&self, top: &Map<String, Value>, point: &ParameterPoint) -> Vec<(String, Value)> {
        let echoed = |name: &str| top.get(name).filter(|value| is_scalar(value)).cloned();

        let mut tags = point
            .iter()
            .map(|(name, requested)| {
                let value = echoed(name).unwrap_or_else(|| requested.to_json());
                (name.to_string(), value)
            })
            .collect::<Vec<_>>();

        for field in &self.propagate {
            if tags.iter().any(|(name, _)| name == field) {
                continue;
            }
            if let Some(value) = echoed(field) {
                tags.push((field.clone(), value));
            }
        }
        tags
    }

    fn normalize(&self, mut record: Record, tags: &[(String, Value)]) -> Record {
        for field in &self.drop_fields {
            record.remove(field);
        }
        for (from, to) in &self.rename {
            if let Some(value) = record.remove(from) {
                record.insert(to.clone(), value);
            }
        }
        for (name, value) in tags {
            record.insert(name.clone(), value.clone());
        }
        record
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::grid::{ParamValue, ParameterAxis, ParameterGrid};
    use crate::PointErrorKind;

    fn point(week: i64, season: i64) -> ParameterPoint {
        ParameterGrid::new(vec![
            ParameterAxis::new("week", vec![ParamValue::Int(week)]).expect("week"),
            ParameterAxis::new("season", vec![ParamValue::Int(season)]).expect("season"),
        ])
        .expect("grid")
        .point_at(0)
        .expect("point")
    }

    #[test]
    fn drops_fields_and_tags_with_axis_values() {
        let extraction = Extraction::new("stats").expect("valid").drop_field("player");
        let body = json!({"stats": [{"player": "X", "yards": 10}]}).to_string();

        let records = extraction.extract(&body, &point(3, 2021)).expect("records");

        assert_eq!(records.len(), 1);
        assert_eq!(
            Value::Object(records[0].clone()),
            json!({"yards": 10, "week": 3, "season": 2021})
        );
    }

    #[test]
    fn echoed_values_win_over_requested_values() {
        let extraction = Extraction::new("stats").expect("valid");
        let body = json!({"stats": [{"yards": 1}], "week": 4, "season": "2021REG"}).to_string();

        let records = extraction.extract(&body, &point(3, 2021)).expect("records");

        assert_eq!(records[0]["week"], json!(4));
        assert_eq!(records[0]["season"], json!("2021REG"));
    }

    #[test]
    fn non_scalar_echo_is_ignored() {
        let extraction = Extraction::new("stats").expect("valid");
        let body = json!({"stats": [{"yards": 1}], "week": {"id": 4}}).to_string();

        let records = extraction.extract(&body, &point(3, 2021)).expect("records");

        assert_eq!(records[0]["week"], json!(3));
    }

    #[test]
    fn renames_and_propagates_metadata() {
        let extraction = Extraction::new("/data/rows")
            .expect("valid")
            .rename_field("yds", "yards")
            .propagate_field("seasonType")
            .propagate_field("missing");
        let body = json!({"data": {"rows": [{"yds": 7}]}, "seasonType": "REG"}).to_string();

        let records = extraction.extract(&body, &point(1, 2022)).expect("records");

        assert_eq!(
            Value::Object(records[0].clone()),
            json!({"yards": 7, "week": 1, "season": 2022, "seasonType": "REG"})
        );
    }

    #[test]
    fn empty_records_list_is_not_an_error() {
        let extraction = Extraction::new("stats").expect("valid");

        let records = extraction
            .extract(r#"{"stats": []}"#, &point(1, 2021))
            .expect("records");

        assert!(records.is_empty());
    }

    #[test]
    fn shape_mismatches_are_parse_errors() {
        let extraction = Extraction::new("stats").expect("valid");
        let point = point(1, 2021);

        for body in [
            "not json",
            "[1, 2, 3]",
            r#"{"other": []}"#,
            r#"{"stats": {"yards": 1}}"#,
            r#"{"stats": [1]}"#,
        ] {
            let error = extraction.extract(body, &point).expect_err(body);
            assert_eq!(error.kind(), PointErrorKind::Parse, "{body}");
        }
    }

    #[test]
    fn blank_records_key_is_rejected() {
        assert_eq!(Extraction::new(" "), Err(ValidationError::EmptyRecordsKey));
    }
}
