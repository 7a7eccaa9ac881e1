//! Shared fixtures for the behavior tests: a scripted fake upstream that
//! serves both the token endpoint and the stats endpoint.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gridharvest_core::{
    ClientCredentialsProvider, Credentials, Extraction, HttpClient, HttpError, HttpRequest,
    HttpResponse, ParamValue, ParameterAxis, ParameterGrid, RequestSpec, RetryConfig,
    TokenSession, UrlTemplate,
};
use serde_json::{json, Value};

pub const TOKEN_URL: &str = "https://auth.example.test/oauth/token";
pub const STATS_URL: &str = "https://api.example.test/stats?season={season}&week={week}";

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync;
type Latency = dyn Fn(&HttpRequest) -> Duration + Send + Sync;

/// Fake upstream. Token requests are answered from a script, falling back to
/// a fresh `token-<n>` valid for an hour; every other request goes to `handler`.
pub struct FakeApi {
    handler: Box<Handler>,
    latency: Option<Box<Latency>>,
    token_script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    token_requests: Mutex<Vec<HttpRequest>>,
    resource_requests: Mutex<Vec<HttpRequest>>,
    token_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeApi {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            latency: None,
            token_script: Mutex::new(VecDeque::new()),
            token_requests: Mutex::new(Vec::new()),
            resource_requests: Mutex::new(Vec::new()),
            token_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// An upstream that echoes the requested week and season.
    pub fn echoing() -> Self {
        Self::new(|request| Ok(HttpResponse::ok_json(echo_body(request).to_string())))
    }

    pub fn with_token_script(self, script: Vec<Result<HttpResponse, HttpError>>) -> Self {
        *self.token_script.lock().expect("lock") = script.into();
        self
    }

    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&HttpRequest) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Box::new(latency));
        self
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn token_requests(&self) -> Vec<HttpRequest> {
        self.token_requests.lock().expect("lock").clone()
    }

    pub fn resource_requests(&self) -> Vec<HttpRequest> {
        self.resource_requests.lock().expect("lock").clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl HttpClient for FakeApi {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            if request.url == TOKEN_URL {
                let call = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
                self.token_requests.lock().expect("lock").push(request);
                let scripted = self.token_script.lock().expect("lock").pop_front();
                return scripted.unwrap_or_else(|| {
                    Ok(HttpResponse::ok_json(
                        json!({"access_token": format!("token-{call}"), "expires_in": 3600})
                            .to_string(),
                    ))
                });
            }

            self.resource_requests.lock().expect("lock").push(request.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(latency) = &self.latency {
                tokio::time::sleep(latency(&request)).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.handler)(&request)
        })
    }
}

/// Session against [`TOKEN_URL`] with near-instant retries.
pub fn session(api: Arc<FakeApi>) -> TokenSession {
    TokenSession::new(Arc::new(provider(api)), credentials(), Some(String::from("stats")))
}

pub fn provider(api: Arc<FakeApi>) -> ClientCredentialsProvider {
    ClientCredentialsProvider::new(api, TOKEN_URL)
        .with_retry(RetryConfig::fixed(Duration::from_millis(1), 3))
}

pub fn credentials() -> Credentials {
    Credentials::new("client", "secret").expect("credentials")
}

pub fn stats_request() -> RequestSpec {
    RequestSpec::get(UrlTemplate::parse(STATS_URL).expect("template"))
        .with_header("Referer", "https://www.example.test/")
}

pub fn stats_extraction() -> Extraction {
    Extraction::new("stats").expect("extraction").drop_field("player")
}

pub fn week_season_grid(weeks: std::ops::RangeInclusive<i64>, seasons: &[i64]) -> ParameterGrid {
    ParameterGrid::new(vec![
        ParameterAxis::range("week", *weeks.start(), *weeks.end()).expect("week"),
        ParameterAxis::new(
            "season",
            seasons.iter().copied().map(ParamValue::Int).collect(),
        )
        .expect("season"),
    ])
    .expect("grid")
}

/// Decoded value of query parameter `name`.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| {
            urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
    })
}

pub fn int_param(request: &HttpRequest, name: &str) -> i64 {
    query_param(&request.url, name)
        .and_then(|value| value.parse().ok())
        .unwrap_or_else(|| panic!("request {} has no integer '{name}'", request.url))
}

/// `{"stats": [...], "week": w, "season": s}` with one row per week.
pub fn echo_body(request: &HttpRequest) -> Value {
    let week = int_param(request, "week");
    let season = int_param(request, "season");
    json!({
        "week": week,
        "season": season,
        "stats": [{"player": "X", "player_id": format!("P{season}-{week}"), "yards": week * 10}],
    })
}
