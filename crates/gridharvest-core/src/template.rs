use std::collections::BTreeSet;

use crate::grid::{ParameterGrid, ParameterPoint};
use crate::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Endpoint (or body) template with `{axis}` placeholders.
///
/// Rendered values are percent-encoded. `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    raw: String,
    segments: Vec<Segment>,
    encode: bool,
}

impl UrlTemplate {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let segments = parse_segments(&raw)?;
        Ok(Self {
            raw,
            segments,
            encode: true,
        })
    }

    /// Template whose substituted values are inserted verbatim (e.g. JSON bodies).
    pub fn parse_verbatim(raw: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self {
            encode: false,
            ..Self::parse(raw)?
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn placeholders(&self) -> BTreeSet<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Fails when a placeholder does not name one of the grid's axes.
    pub fn validate_against(&self, grid: &ParameterGrid) -> Result<(), ValidationError> {
        match self.placeholders().into_iter().find(|name| !grid.has_axis(name)) {
            Some(name) => Err(ValidationError::UnknownPlaceholder {
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn render(&self, point: &ParameterPoint) -> Result<String, ValidationError> {
        let mut rendered = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder(name) => {
                    let value = point
                        .get(name)
                        .ok_or_else(|| ValidationError::UnknownPlaceholder { name: name.clone() })?
                        .to_string();
                    if self.encode {
                        rendered.push_str(&urlencoding::encode(&value));
                    } else {
                        rendered.push_str(&value);
                    }
                }
            }
        }
        Ok(rendered)
    }
}

fn parse_segments(raw: &str) -> Result<Vec<Segment>, ValidationError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(ValidationError::UnterminatedPlaceholder {
                        template: raw.to_string(),
                    });
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(ValidationError::EmptyPlaceholder {
                        template: raw.to_string(),
                    });
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name.to_string()));
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}
