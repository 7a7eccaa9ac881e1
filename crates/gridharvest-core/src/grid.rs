//! Parameter axes and their Cartesian product.
//!
//! Grid expansion is pure: it never touches the network and always yields
//! points in the same order. The first declared axis is the outermost
//! (slowest-varying) one, so `week=1..2, season=2021,2022` expands to
//! `(1,2021) (1,2022) (2,2021) (2,2022)`.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::ValidationError;

/// Scalar value of one axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ParamValue {
    /// Parses a CLI token: integers and booleans keep their type, anything else is text.
    pub fn parse_token(token: &str) -> Self {
        let token = token.trim();
        if let Ok(value) = token.parse::<i64>() {
            return Self::Int(value);
        }
        match token {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Text(token.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Int(number) => Value::from(*number),
            Self::Text(text) => Value::String(text.clone()),
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Int(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Named, ordered, non-empty sequence of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterAxis {
    name: String,
    values: Vec<ParamValue>,
}

impl ParameterAxis {
    pub fn new(name: impl Into<String>, values: Vec<ParamValue>) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyAxisName);
        }
        if values.is_empty() {
            return Err(ValidationError::EmptyAxis { name });
        }

        Ok(Self { name, values })
    }

    /// Inclusive integer range, e.g. weeks `1..=18`.
    pub fn range(name: impl Into<String>, start: i64, end: i64) -> Result<Self, ValidationError> {
        let name = name.into();
        if end < start {
            return Err(ValidationError::DescendingRange { name, start, end });
        }

        Self::new(name, (start..=end).map(ParamValue::Int).collect())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromStr for ParameterAxis {
    type Err = ValidationError;

    /// Accepts `name=start..end` (inclusive) or `name=v1,v2,...`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidAxisSpec {
            value: spec.to_string(),
        };
        let (name, raw_values) = spec.split_once('=').ok_or_else(invalid)?;
        let raw_values = raw_values.trim();

        if let Some((start, end)) = raw_values.split_once("..") {
            let start = start.trim().parse::<i64>().map_err(|_| invalid())?;
            let end = end.trim().parse::<i64>().map_err(|_| invalid())?;
            return Self::range(name, start, end);
        }

        let values = raw_values
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ParamValue::parse_token)
            .collect();
        Self::new(name, values)
    }
}

/// One element of a [`ParameterGrid`]: axis values in declared axis order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterPoint {
    index: usize,
    values: Vec<(String, ParamValue)>,
}

impl ParameterPoint {
    pub fn new(index: usize, values: Vec<(String, ParamValue)>) -> Self {
        Self { index, values }
    }

    /// Position of this point in grid order.
    pub const fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, axis: &str) -> Option<&ParamValue> {
        self.values
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Display for ParameterPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let rendered = self
            .values
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&rendered)
    }
}

struct ParamsView<'a>(&'a [(String, ParamValue)]);

impl Serialize for ParamsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for ParameterPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ParameterPoint", 2)?;
        state.serialize_field("index", &self.index)?;
        state.serialize_field("params", &ParamsView(&self.values))?;
        state.end()
    }
}

/// Cartesian product of one or more axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterGrid {
    axes: Vec<ParameterAxis>,
    len: usize,
}

impl ParameterGrid {
    pub fn new(axes: Vec<ParameterAxis>) -> Result<Self, ValidationError> {
        if axes.is_empty() {
            return Err(ValidationError::EmptyGrid);
        }

        let mut seen = HashSet::with_capacity(axes.len());
        for axis in &axes {
            if !seen.insert(axis.name()) {
                return Err(ValidationError::DuplicateAxis {
                    name: axis.name().to_string(),
                });
            }
        }

        let len = axes.iter().try_fold(1_usize, |acc, axis| {
            acc.checked_mul(axis.len())
                .ok_or(ValidationError::GridTooLarge)
        })?;

        Ok(Self { axes, len })
    }

    /// Number of points, always the product of the axis lengths.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn axes(&self) -> &[ParameterAxis] {
        &self.axes
    }

    pub fn has_axis(&self, name: &str) -> bool {
        self.axes.iter().any(|axis| axis.name() == name)
    }

    /// Decodes grid position `index` without materializing the grid.
    pub fn point_at(&self, index: usize) -> Option<ParameterPoint> {
        if index >= self.len {
            return None;
        }

        let mut remainder = index;
        let mut values = Vec::with_capacity(self.axes.len());
        for axis in self.axes.iter().rev() {
            let position = remainder % axis.len();
            remainder /= axis.len();
            values.push((axis.name().to_string(), axis.values()[position].clone()));
        }
        values.reverse();

        Some(ParameterPoint::new(index, values))
    }

    pub fn iter(&self) -> impl Iterator<Item = ParameterPoint> + '_ {
        (0..self.len).filter_map(move |index| self.point_at(index))
    }
}
