use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation and configuration errors exposed by `gridharvest-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("client_id cannot be empty")]
    EmptyClientId,
    #[error("client_secret cannot be empty")]
    EmptyClientSecret,
    #[error("environment variable '{var}' is not set")]
    MissingEnvVar { var: String },

    #[error("axis name cannot be empty")]
    EmptyAxisName,
    #[error("axis '{name}' must contain at least one value")]
    EmptyAxis { name: String },
    #[error("axis '{name}' is declared more than once")]
    DuplicateAxis { name: String },
    #[error("parameter grid needs at least one axis")]
    EmptyGrid,
    #[error("invalid axis spec '{value}', expected name=a,b,c or name=start..end")]
    InvalidAxisSpec { value: String },
    #[error("axis '{name}' range {start}..{end} is descending")]
    DescendingRange { name: String, start: i64, end: i64 },
    #[error("parameter grid size overflows usize")]
    GridTooLarge,

    #[error("template '{template}' has an unterminated placeholder")]
    UnterminatedPlaceholder { template: String },
    #[error("template '{template}' has an empty placeholder")]
    EmptyPlaceholder { template: String },
    #[error("template placeholder '{{{name}}}' does not name a grid axis")]
    UnknownPlaceholder { name: String },

    #[error("records key cannot be empty")]
    EmptyRecordsKey,
    #[error("concurrency must be greater than zero")]
    ZeroConcurrency,
    #[error("requests_per_second must be greater than zero")]
    ZeroRateLimit,
    #[error("timeout_ms must be greater than zero")]
    ZeroTimeout,
    #[error("refresh_margin_secs must be between 0 and {max}, got {secs}")]
    RefreshMarginOutOfRange { secs: i64, max: i64 },
}

/// Failure to obtain a bearer token. Always fatal for a harvest.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token endpoint transport failed: {0}")]
    Transport(String),
    #[error("token endpoint returned status {status}")]
    Status { status: u16 },
    #[error("token response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("token response has no string access_token field")]
    MissingAccessToken,
}

/// Top-level error returned by [`crate::Harvester::harvest`].
///
/// Per-point failures never surface here; they are collected in the report.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Category of a non-fatal, per-point failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointErrorKind {
    /// Transport failure, timeout or non-success HTTP status.
    Fetch,
    /// Body was not JSON or did not have the expected shape.
    Parse,
    /// The harvest was cancelled before this point was fetched.
    Cancelled,
}

impl PointErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch_error",
            Self::Parse => "parse_error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for PointErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail attached to a failed [`crate::FetchResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointError {
    pub kind: PointErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl PointError {
    pub fn fetch(message: impl Into<String>) -> Self {
        Self {
            kind: PointErrorKind::Fetch,
            message: message.into(),
            status: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            kind: PointErrorKind::Fetch,
            message: format!("upstream returned status {status}"),
            status: Some(status),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: PointErrorKind::Parse,
            message: message.into(),
            status: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: PointErrorKind::Cancelled,
            message: String::from("harvest cancelled before this point was fetched"),
            status: None,
        }
    }

    pub const fn kind(&self) -> PointErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for PointError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for PointError {}
