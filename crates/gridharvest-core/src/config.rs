//! TOML job files describing one harvest.
//!
//! Credentials never live in the job file; it only names the environment
//! variables that hold them.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use time::Duration;

use crate::credentials::{Credentials, DEFAULT_CLIENT_ID_ENV, DEFAULT_CLIENT_SECRET_ENV};
use crate::extract::Extraction;
use crate::grid::{ParamValue, ParameterAxis, ParameterGrid};
use crate::harvest::{Harvester, RequestSpec};
use crate::http_client::{HttpClient, HttpMethod};
use crate::retry::RetryConfig;
use crate::template::UrlTemplate;
use crate::token::{ClientCredentialsProvider, TokenSession};
use crate::ValidationError;

/// Errors raised while loading or applying a job file.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to read job file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid job file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("axis '{name}' must set exactly one of 'values' or 'range'")]
    AmbiguousAxis { name: String },
}

/// Token endpoint settings. Omit the `[auth]` table for unauthenticated APIs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub token_url: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_client_id_env")]
    pub client_id_env: String,
    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,
    #[serde(default = "default_token_retries")]
    pub max_retries: u32,
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodConfig {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestConfig {
    pub url: String,
    #[serde(default)]
    pub method: MethodConfig,
    /// Body template for POST endpoints; values are inserted verbatim.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarvestSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            requests_per_second: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AxisConfig {
    pub name: String,
    #[serde(default)]
    pub values: Vec<ParamValue>,
    /// Inclusive integer range `[start, end]`.
    #[serde(default)]
    pub range: Option<[i64; 2]>,
}

impl AxisConfig {
    fn to_axis(&self) -> Result<ParameterAxis, JobError> {
        match (self.range, self.values.is_empty()) {
            (Some([start, end]), true) => Ok(ParameterAxis::range(self.name.as_str(), start, end)?),
            (None, _) => Ok(ParameterAxis::new(self.name.as_str(), self.values.clone())?),
            (Some(_), false) => Err(JobError::AmbiguousAxis {
                name: self.name.clone(),
            }),
        }
    }
}

/// A complete harvest job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    pub request: RequestConfig,
    pub extract: Extraction,
    #[serde(default)]
    pub harvest: HarvestSettings,
    pub axes: Vec<AxisConfig>,
}

impl JobConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, JobError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| JobError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, JobError> {
        let job: Self = toml::from_str(raw)?;
        job.extract.validate()?;
        Ok(job)
    }

    /// Axes from the job file, in declared order.
    pub fn axes(&self) -> Result<Vec<ParameterAxis>, JobError> {
        self.axes.iter().map(AxisConfig::to_axis).collect()
    }

    /// Replaces the axis with the same name, or appends it when the job has none.
    pub fn override_axis(&mut self, axis: &ParameterAxis) {
        let replacement = AxisConfig {
            name: axis.name().to_string(),
            values: axis.values().to_vec(),
            range: None,
        };
        match self
            .axes
            .iter_mut()
            .find(|existing| existing.name.trim() == axis.name())
        {
            Some(existing) => *existing = replacement,
            None => self.axes.push(replacement),
        }
    }

    pub fn grid(&self) -> Result<ParameterGrid, JobError> {
        Ok(ParameterGrid::new(self.axes()?)?)
    }

    pub fn request_spec(&self) -> Result<RequestSpec, JobError> {
        let mut spec = RequestSpec::get(UrlTemplate::parse(self.request.url.as_str())?)
            .with_timeout_ms(self.request.timeout_ms);
        spec.headers = self.request.headers.clone();

        if let Some(body) = &self.request.body {
            spec = spec.with_body(UrlTemplate::parse_verbatim(body.as_str())?);
        }
        // A body always implies POST.
        if self.request.method == MethodConfig::Post {
            spec.method = HttpMethod::Post;
        }
        Ok(spec)
    }

    /// Builds the token session when the job has an `[auth]` table.
    ///
    /// `lookup` resolves environment variable names to values.
    pub fn token_session<F>(
        &self,
        http_client: Arc<dyn HttpClient>,
        lookup: F,
    ) -> Result<Option<TokenSession>, JobError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(auth) = &self.auth else {
            return Ok(None);
        };

        if !(0..=MAX_REFRESH_MARGIN_SECS).contains(&auth.refresh_margin_secs) {
            return Err(ValidationError::RefreshMarginOutOfRange {
                secs: auth.refresh_margin_secs,
                max: MAX_REFRESH_MARGIN_SECS,
            }
            .into());
        }

        let credentials =
            Credentials::from_lookup(&auth.client_id_env, &auth.client_secret_env, lookup)?;
        let provider = ClientCredentialsProvider::new(http_client, auth.token_url.as_str())
            .with_retry(RetryConfig::exponential(auth.max_retries))
            .with_timeout_ms(self.request.timeout_ms);

        Ok(Some(
            TokenSession::new(Arc::new(provider), credentials, auth.scope.clone())
                .with_refresh_margin(Duration::seconds(auth.refresh_margin_secs)),
        ))
    }

    /// Wires a [`Harvester`] from this job. Credentials are read through `lookup`.
    pub fn harvester<F>(&self, http_client: Arc<dyn HttpClient>, lookup: F) -> Result<Harvester, JobError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.harvest.concurrency == 0 {
            return Err(ValidationError::ZeroConcurrency.into());
        }

        let mut harvester = Harvester::new(
            Arc::clone(&http_client),
            self.request_spec()?,
            self.extract.clone(),
        )
        .with_concurrency(self.harvest.concurrency);

        if let Some(rps) = self.harvest.requests_per_second {
            let rps = NonZeroU32::new(rps).ok_or(ValidationError::ZeroRateLimit)?;
            harvester = harvester.with_rate_limit(rps);
        }
        if let Some(session) = self.token_session(http_client, lookup)? {
            harvester = harvester.with_session(Arc::new(session));
        }
        Ok(harvester)
    }
}

fn default_client_id_env() -> String {
    String::from(DEFAULT_CLIENT_ID_ENV)
}

fn default_client_secret_env() -> String {
    String::from(DEFAULT_CLIENT_SECRET_ENV)
}

const fn default_token_retries() -> u32 {
    3
}

/// Upper bound for `refresh_margin_secs`, one day.
const MAX_REFRESH_MARGIN_SECS: i64 = 86_400;

const fn default_refresh_margin_secs() -> i64 {
    30
}

const fn default_timeout_ms() -> u64 {
    10_000
}

const fn default_concurrency() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"
[auth]
token_url = "https://auth.example.test/oauth/token"
scope = "stats"
client_id_env = "NFL_CLIENT_ID"
client_secret_env = "NFL_CLIENT_SECRET"

[request]
url = "https://api.example.test/stats?season={season}&week={week}"
headers = { Referer = "https://www.example.test/", "Cache-Control" = "no-cache" }

[extract]
records = "stats"
drop_fields = ["player"]

[harvest]
concurrency = 4
requests_per_second = 5

[[axes]]
name = "week"
range = [1, 18]

[[axes]]
name = "season"
values = [2021, 2022]
"#;

    #[test]
    fn parses_a_full_job() {
        let job = JobConfig::from_toml_str(JOB).expect("job");

        let auth = job.auth.as_ref().expect("auth");
        assert_eq!(auth.client_id_env, "NFL_CLIENT_ID");
        assert_eq!(auth.max_retries, 3);
        assert_eq!(job.request.method, MethodConfig::Get);
        assert_eq!(job.request.timeout_ms, 10_000);
        assert_eq!(job.harvest.concurrency, 4);
        assert!(job.extract.drop_fields.contains("player"));
        assert_eq!(job.grid().expect("grid").len(), 36);
    }

    #[test]
    fn loads_job_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("weekly.toml");
        std::fs::write(&path, JOB).expect("write job");

        let job = JobConfig::from_path(&path).expect("job");

        assert_eq!(job.axes.len(), 2);
        assert_eq!(job.request_spec().expect("request").headers.len(), 2);
    }

    #[test]
    fn missing_job_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");

        let error = JobConfig::from_path(dir.path().join("absent.toml")).expect_err("missing");

        assert!(matches!(error, JobError::Io { .. }));
    }

    #[test]
    fn axis_overrides_replace_or_extend_the_grid() {
        let mut job = JobConfig::from_toml_str(JOB).expect("job");

        job.override_axis(&"week=1..2".parse::<ParameterAxis>().expect("week"));
        job.override_axis(&"kind=REG,POST".parse::<ParameterAxis>().expect("kind"));

        let grid = job.grid().expect("grid");
        let names = grid.axes().iter().map(ParameterAxis::name).collect::<Vec<_>>();
        assert_eq!(names, vec!["week", "season", "kind"]);
        assert_eq!(grid.len(), 2 * 2 * 2);
    }

    #[test]
    fn post_job_renders_a_verbatim_body() {
        let job = JobConfig::from_toml_str(
            r#"
[request]
url = "https://api.example.test/query"
method = "post"
body = '{{"week": {week}}}'

[extract]
records = "rows"

[[axes]]
name = "week"
values = [7]
"#,
        )
        .expect("job");

        let spec = job.request_spec().expect("request");
        let point = job.grid().expect("grid").point_at(0).expect("point");

        assert_eq!(spec.method, HttpMethod::Post);
        assert_eq!(
            spec.body.as_ref().expect("body").render(&point).expect("render"),
            r#"{"week": 7}"#
        );
    }

    #[test]
    fn unauthenticated_job_needs_no_credentials() {
        let job = JobConfig::from_toml_str(
            r#"
[request]
url = "https://api.example.test/{week}"

[extract]
records = "rows"

[[axes]]
name = "week"
values = [1, 2]
"#,
        )
        .expect("job");

        let http: Arc<dyn HttpClient> = Arc::new(crate::ReqwestHttpClient::new());
        let session = job.token_session(http, |_| None).expect("no auth");
        assert!(session.is_none());
        assert_eq!(job.harvest, HarvestSettings::default());
    }

    #[test]
    fn missing_credentials_are_reported_by_variable_name() {
        let job = JobConfig::from_toml_str(JOB).expect("job");
        let http: Arc<dyn HttpClient> = Arc::new(crate::ReqwestHttpClient::new());

        let error = job.harvester(http, |_| None).expect_err("no env");

        assert!(
            error.to_string().contains("NFL_CLIENT_ID"),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn axis_with_values_and_range_is_ambiguous() {
        let job = JobConfig::from_toml_str(
            r#"
[request]
url = "https://api.example.test/{week}"

[extract]
records = "rows"

[[axes]]
name = "week"
values = [1]
range = [1, 2]
"#,
        )
        .expect("parses");

        assert!(matches!(job.grid(), Err(JobError::AmbiguousAxis { .. })));
    }

    #[test]
    fn refresh_margin_outside_one_day_is_rejected() {
        let lookup = |var: &str| Some(format!("{var}-value"));

        for margin in [-1, 86_401, i64::MAX] {
            let raw = JOB.replace(
                "client_secret_env = \"NFL_CLIENT_SECRET\"",
                &format!("client_secret_env = \"NFL_CLIENT_SECRET\"\nrefresh_margin_secs = {margin}"),
            );
            let job = JobConfig::from_toml_str(&raw).expect("job");
            let http: Arc<dyn HttpClient> = Arc::new(crate::ReqwestHttpClient::new());

            let error = job.token_session(http, lookup).expect_err("margin out of range");

            assert!(
                matches!(
                    error,
                    JobError::Validation(ValidationError::RefreshMarginOutOfRange { secs, .. }) if secs == margin
                ),
                "unexpected error: {error}"
            );
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let request_typo = r#"
[request]
url = "https://api.example.test/"
verb = "GET"

[extract]
records = "rows"

[[axes]]
name = "week"
values = [1]
"#;
        let extract_typo = r#"
[request]
url = "https://api.example.test/"

[extract]
records = "rows"
drop_field = ["player"]

[[axes]]
name = "week"
values = [1]
"#;

        for raw in [request_typo, extract_typo] {
            let error = JobConfig::from_toml_str(raw).expect_err("unknown key");
            assert!(matches!(error, JobError::Toml(_)), "unexpected error: {error}");
        }
    }
}
