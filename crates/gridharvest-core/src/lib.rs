//! # Gridharvest Core
//!
//! Authenticated bulk harvesting of a parameterized JSON endpoint.
//!
//! ## Overview
//!
//! A harvest takes the cartesian product of a set of named parameter axes
//! (for example `week` × `season`), issues one authenticated request per
//! point, normalizes each response into records and concatenates them into a
//! single [`HarvestTable`] with a unioned schema.
//!
//! - **Token exchange**: OAuth2 client credentials, refreshed before expiry
//! - **Parameter grid**: deterministic, first axis outermost
//! - **Extraction**: strict response shape checks, echo-tagging of records
//! - **Partial failure**: failed points land in a manifest, never abort
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | TOML job files |
//! | [`credentials`] | Client id/secret loading |
//! | [`error`] | Core error types |
//! | [`extract`] | Response validation and record normalization |
//! | [`grid`] | Parameter axes, points and grids |
//! | [`harvest`] | The concurrent harvester and its report |
//! | [`http_client`] | HTTP client abstraction |
//! | [`retry`] | Retry with backoff for the token exchange |
//! | [`table`] | Schema-unioned concatenation |
//! | [`template`] | `{axis}` URL and body templates |
//! | [`token`] | Bearer tokens and the token session |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gridharvest_core::{
//!     ClientCredentialsProvider, Credentials, Extraction, Harvester, ParameterAxis,
//!     ParameterGrid, ReqwestHttpClient, RequestSpec, TokenSession, UrlTemplate,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let http = Arc::new(ReqwestHttpClient::new());
//!     let provider = ClientCredentialsProvider::new(http.clone(), "https://auth.example.test/token");
//!     let session = TokenSession::new(
//!         Arc::new(provider),
//!         Credentials::from_env("CLIENT_ID", "CLIENT_SECRET")?,
//!         None,
//!     );
//!
//!     let grid = ParameterGrid::new(vec![
//!         ParameterAxis::range("week", 1, 18)?,
//!         ParameterAxis::range("season", 2021, 2022)?,
//!     ])?;
//!     let request = RequestSpec::get(UrlTemplate::parse(
//!         "https://api.example.test/stats?season={season}&week={week}",
//!     )?);
//!
//!     let report = Harvester::new(http, request, Extraction::new("stats")?)
//!         .with_session(Arc::new(session))
//!         .with_concurrency(4)
//!         .harvest(&grid, &CancellationToken::new())
//!         .await?;
//!
//!     println!("{} rows, {} failed points", report.table.len(), report.failures.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Only configuration errors and token acquisition failures are returned as
//! [`HarvestError`]. Everything that goes wrong for a single point is
//! recorded as a [`PointError`] in the report:
//!
//! ```rust
//! use gridharvest_core::{HarvestReport, PointErrorKind};
//!
//! fn summarize(report: &HarvestReport) {
//!     for failure in &report.failures {
//!         match failure.error.kind() {
//!             PointErrorKind::Fetch => eprintln!("{}: fetch failed", failure.point),
//!             PointErrorKind::Parse => eprintln!("{}: bad response", failure.point),
//!             PointErrorKind::Cancelled => {}
//!         }
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - Client secrets are read from environment variables only and never logged
//! - Bearer tokens and authorization headers are redacted from `Debug` output

pub mod config;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod grid;
pub mod harvest;
pub mod http_client;
pub mod retry;
pub mod table;
pub mod template;
pub mod token;

// Job files
pub use config::{AuthConfig, AxisConfig, HarvestSettings, JobConfig, JobError, RequestConfig};

// Credentials
pub use credentials::{Credentials, DEFAULT_CLIENT_ID_ENV, DEFAULT_CLIENT_SECRET_ENV};

// Error types
pub use error::{AuthError, HarvestError, PointError, PointErrorKind, ValidationError};

// Extraction
pub use extract::{Extraction, Record};

// Grid types
pub use grid::{ParamValue, ParameterAxis, ParameterGrid, ParameterPoint};

// Harvester
pub use harvest::{FailedPoint, FetchResult, HarvestReport, HarvestStats, Harvester, RequestSpec};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Tables
pub use table::{HarvestTable, SchemaMismatch};

// Templates
pub use template::UrlTemplate;

// Tokens
pub use token::{ClientCredentialsProvider, Token, TokenSession, TokenSource};

// Cancellation is part of the public harvest API.
pub use tokio_util::sync::CancellationToken;
