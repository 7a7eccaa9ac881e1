//! The grid harvester: one authenticated request per parameter point.
//!
//! A harvest acquires the bearer token first (an [`AuthError`] aborts before
//! any resource request), then fetches every point with at most
//! `concurrency` requests in flight. Per-point failures are recorded and the
//! harvest carries on; the report always contains the best-effort table plus
//! a manifest of the points that failed.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use serde::Serialize;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::extract::{Extraction, Record};
use crate::grid::{ParameterGrid, ParameterPoint};
use crate::http_client::{HttpClient, HttpMethod, HttpRequest};
use crate::table::{HarvestTable, SchemaMismatch};
use crate::template::UrlTemplate;
use crate::token::{Token, TokenSession};
use crate::{HarvestError, PointError, PointErrorKind, ValidationError};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Outcome of fetching one parameter point. `records` is empty when `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    pub point: ParameterPoint,
    pub records: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PointError>,
}

impl FetchResult {
    pub fn success(point: ParameterPoint, records: Vec<Record>) -> Self {
        Self {
            point,
            records,
            error: None,
        }
    }

    pub fn failure(point: ParameterPoint, error: PointError) -> Self {
        Self {
            point,
            records: Vec::new(),
            error: Some(error),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn status(&self) -> Option<u16> {
        self.error.as_ref().and_then(|error| error.status)
    }
}

/// How a point is turned into an HTTP request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub url: UrlTemplate,
    /// Optional templated body, sent with POST endpoints.
    pub body: Option<UrlTemplate>,
    /// Static headers such as Referer, User-Agent or Cache-Control.
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl RequestSpec {
    pub fn get(url: UrlTemplate) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            body: None,
            headers: BTreeMap::new(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: UrlTemplate) -> Self {
        self.method = HttpMethod::Post;
        self.body = Some(body);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Checks the timeout and that the URL and body placeholders all name axes of `grid`.
    pub fn validate(&self, grid: &ParameterGrid) -> Result<(), ValidationError> {
        if self.timeout_ms == 0 {
            return Err(ValidationError::ZeroTimeout);
        }
        self.url.validate_against(grid)?;
        if let Some(body) = &self.body {
            body.validate_against(grid)?;
        }
        Ok(())
    }

    fn build(&self, point: &ParameterPoint, token: Option<&Token>) -> Result<HttpRequest, ValidationError> {
        let mut request =
            HttpRequest::new(self.method, self.url.render(point)?).with_timeout_ms(self.timeout_ms);

        for (name, value) in &self.headers {
            request = request.with_header(name.as_str(), value.as_str());
        }
        if let Some(body) = &self.body {
            request = request.with_body(body.render(point)?);
        }
        if let Some(token) = token {
            request = request.with_auth(&token.bearer());
        }
        Ok(request)
    }
}

/// A point that produced no records, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPoint {
    pub point: ParameterPoint,
    pub error: PointError,
}

/// Counters summarizing a harvest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarvestStats {
    pub points: usize,
    pub succeeded: usize,
    pub fetch_errors: usize,
    pub parse_errors: usize,
    pub cancelled: usize,
    pub records: usize,
}

/// Best-effort result of a harvest.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub run_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub elapsed_ms: u64,
    pub stats: HarvestStats,
    pub table: HarvestTable,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailedPoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schema_mismatches: Vec<SchemaMismatch>,
}

impl HarvestReport {
    fn from_results(results: &[FetchResult], started_at: OffsetDateTime, elapsed_ms: u64) -> Self {
        let (table, schema_mismatches) = HarvestTable::concatenate(results);

        let mut stats = HarvestStats {
            points: results.len(),
            records: table.len(),
            ..HarvestStats::default()
        };
        let mut failures = Vec::new();

        for result in results {
            match &result.error {
                None => stats.succeeded += 1,
                Some(error) => {
                    match error.kind() {
                        PointErrorKind::Fetch => stats.fetch_errors += 1,
                        PointErrorKind::Parse => stats.parse_errors += 1,
                        PointErrorKind::Cancelled => stats.cancelled += 1,
                    }
                    failures.push(FailedPoint {
                        point: result.point.clone(),
                        error: error.clone(),
                    });
                }
            }
        }

        Self {
            run_id: Uuid::new_v4(),
            started_at,
            elapsed_ms,
            stats,
            table,
            failures,
            schema_mismatches,
        }
    }

    /// True when every point produced records (possibly zero of them).
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_points(&self) -> impl Iterator<Item = &ParameterPoint> {
        self.failures.iter().map(|failure| &failure.point)
    }
}

/// Fetches, normalizes and concatenates every point of a grid.
pub struct Harvester {
    http_client: Arc<dyn HttpClient>,
    session: Option<Arc<TokenSession>>,
    request: RequestSpec,
    extraction: Extraction,
    concurrency: usize,
    limiter: Option<Arc<DirectRateLimiter>>,
}

impl Harvester {
    pub fn new(http_client: Arc<dyn HttpClient>, request: RequestSpec, extraction: Extraction) -> Self {
        Self {
            http_client,
            session: None,
            request,
            extraction,
            concurrency: 1,
            limiter: None,
        }
    }

    /// Authenticates every request with the session's bearer token.
    pub fn with_session(mut self, session: Arc<TokenSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Maximum number of requests in flight. `1` fetches strictly sequentially.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Caps the request rate across all in-flight fetches.
    pub fn with_rate_limit(mut self, requests_per_second: NonZeroU32) -> Self {
        self.limiter = Some(Arc::new(RateLimiter::direct(Quota::per_second(
            requests_per_second,
        ))));
        self
    }

    pub fn session(&self) -> Option<&Arc<TokenSession>> {
        self.session.as_ref()
    }

    /// Harvests every point of `grid`.
    ///
    /// Fails only on invalid configuration or when the initial token cannot be
    /// acquired; in that case no resource request is made.
    pub async fn harvest(
        &self,
        grid: &ParameterGrid,
        cancel: &CancellationToken,
    ) -> Result<HarvestReport, HarvestError> {
        self.run(grid, grid.iter().collect(), cancel).await
    }

    /// Re-harvests only the points that failed in `previous`.
    pub async fn retry_failed(
        &self,
        grid: &ParameterGrid,
        previous: &HarvestReport,
        cancel: &CancellationToken,
    ) -> Result<HarvestReport, HarvestError> {
        let points = previous.failed_points().cloned().collect();
        self.run(grid, points, cancel).await
    }

    async fn run(
        &self,
        grid: &ParameterGrid,
        points: Vec<ParameterPoint>,
        cancel: &CancellationToken,
    ) -> Result<HarvestReport, HarvestError> {
        self.validate(grid)?;

        if let Some(session) = &self.session {
            session.current().await?;
        }

        let started_at = OffsetDateTime::now_utc();
        let clock = Instant::now();
        info!(
            points = points.len(),
            concurrency = self.concurrency,
            url = self.request.url.as_str(),
            "starting harvest"
        );

        let results = stream::iter(points)
            .map(|point| self.run_point(point, cancel))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let elapsed_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = HarvestReport::from_results(&results, started_at, elapsed_ms);
        info!(
            run_id = %report.run_id,
            succeeded = report.stats.succeeded,
            failed = report.failures.len(),
            records = report.stats.records,
            columns = report.table.columns().len(),
            elapsed_ms,
            "harvest finished"
        );
        Ok(report)
    }

    fn validate(&self, grid: &ParameterGrid) -> Result<(), ValidationError> {
        if self.concurrency == 0 {
            return Err(ValidationError::ZeroConcurrency);
        }
        self.extraction.validate()?;
        self.request.validate(grid)
    }

    async fn run_point(&self, point: ParameterPoint, cancel: &CancellationToken) -> FetchResult {
        if cancel.is_cancelled() {
            return FetchResult::failure(point, PointError::cancelled());
        }

        if let Some(limiter) = &self.limiter {
            tokio::select! {
                () = limiter.until_ready() => {}
                () = cancel.cancelled() => {
                    return FetchResult::failure(point, PointError::cancelled());
                }
            }
        }

        let Some(session) = &self.session else {
            return self.fetch_point(&point, None).await;
        };

        let token = match session.current().await {
            Ok(token) => token,
            Err(error) => {
                warn!(point = %point, error = %error, "token refresh failed");
                return FetchResult::failure(point, PointError::fetch(format!("token refresh failed: {error}")));
            }
        };

        let result = self.fetch_point(&point, Some(&token)).await;
        if result.status() != Some(401) {
            return result;
        }

        debug!(point = %point, "bearer token rejected; refreshing once");
        match session.refresh_if_current(&token).await {
            Ok(refreshed) => self.fetch_point(&point, Some(&refreshed)).await,
            Err(error) => FetchResult::failure(
                point,
                PointError::fetch(format!("token refresh after 401 failed: {error}")),
            ),
        }
    }

    /// Fetches and extracts a single point with the given token.
    pub async fn fetch_point(&self, point: &ParameterPoint, token: Option<&Token>) -> FetchResult {
        let request = match self.request.build(point, token) {
            Ok(request) => request,
            Err(error) => {
                return FetchResult::failure(
                    point.clone(),
                    PointError::fetch(format!("cannot build request: {error}")),
                );
            }
        };

        debug!(point = %point, url = %request.url, "fetching point");
        let outcome = match self.http_client.execute(request).await {
            Ok(response) if response.is_success() => self.extraction.extract(&response.body, point),
            Ok(response) => Err(PointError::status(response.status)),
            Err(error) => Err(PointError::fetch(format!("transport error: {}", error.message()))),
        };

        match outcome {
            Ok(records) => {
                debug!(point = %point, records = records.len(), "point harvested");
                FetchResult::success(point.clone(), records)
            }
            Err(error) => {
                warn!(point = %point, kind = %error.kind(), error = error.message(), "point failed");
                FetchResult::failure(point.clone(), error)
            }
        }
    }
}

impl std::fmt::Debug for Harvester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("request", &self.request)
            .field("extraction", &self.extraction)
            .field("session", &self.session)
            .field("concurrency", &self.concurrency)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}
