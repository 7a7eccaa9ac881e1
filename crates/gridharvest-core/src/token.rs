//! OAuth2 client-credentials token exchange and token lifetime management.
//!
//! [`ClientCredentialsProvider`] performs the raw exchange and never caches.
//! [`TokenSession`] owns the current token for a harvest: it refreshes the
//! token shortly before expiry and serializes refreshes behind a write lock,
//! so concurrent fetches wait for (and then share) a single new token.

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::credentials::Credentials;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::retry::{execute_with_retry, RetryConfig};
use crate::AuthError;

/// Bearer token returned by the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    access_token: String,
    token_type: String,
    expires_at: Option<OffsetDateTime>,
    scope: Option<String>,
}

impl Token {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: String::from("Bearer"),
            expires_at: None,
            scope: None,
        }
    }

    pub fn with_expires_at(mut self, expires_at: OffsetDateTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub const fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// True when the token is still usable at `now + margin`.
    ///
    /// Tokens without an expiry are treated as valid until the server rejects them.
    /// A margin reaching past the representable date range makes any expiring token stale.
    pub fn is_valid_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now
                .checked_add(margin)
                .is_some_and(|deadline| deadline < expires_at),
            None => true,
        }
    }

    pub fn bearer(&self) -> HttpAuth {
        HttpAuth::BearerToken(self.access_token.clone())
    }

    /// Builds a token from a token-endpoint JSON body received at `received_at`.
    pub fn from_response_body(body: &str, received_at: OffsetDateTime) -> Result<Self, AuthError> {
        let value: Value =
            serde_json::from_str(body).map_err(|error| AuthError::InvalidJson(error.to_string()))?;

        let access_token = value
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingAccessToken)?;

        let mut token = Self::new(access_token);

        if let Some(token_type) = value.get("token_type").and_then(Value::as_str) {
            token.token_type = token_type.to_string();
        }
        if let Some(scope) = value.get("scope").and_then(Value::as_str) {
            token.scope = Some(scope.to_string());
        }
        // An expiry beyond the representable date range is kept as no expiry.
        if let Some(seconds) = value.get("expires_in").and_then(expires_in_seconds) {
            token.expires_at = received_at.checked_add(Duration::seconds(seconds));
        }

        Ok(token)
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

// Some providers send expires_in as a string.
fn expires_in_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|seconds| seconds as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Something that can exchange credentials for a bearer token.
pub trait TokenSource: Send + Sync {
    fn acquire_token<'a>(
        &'a self,
        credentials: &'a Credentials,
        scope: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Token, AuthError>> + Send + 'a>>;
}

/// Client-credentials exchange against a fixed token endpoint.
#[derive(Clone)]
pub struct ClientCredentialsProvider {
    http_client: Arc<dyn HttpClient>,
    token_url: String,
    retry: RetryConfig,
    timeout_ms: u64,
}

impl ClientCredentialsProvider {
    pub fn new(http_client: Arc<dyn HttpClient>, token_url: impl Into<String>) -> Self {
        Self {
            http_client,
            token_url: token_url.into(),
            retry: RetryConfig::default(),
            timeout_ms: 10_000,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn build_request(&self, credentials: &Credentials, scope: Option<&str>) -> HttpRequest {
        let mut form = vec![("grant_type", "client_credentials")];
        if let Some(scope) = scope {
            form.push(("scope", scope));
        }

        HttpRequest::post(self.token_url.as_str())
            .with_auth(&credentials.basic_auth())
            .with_header("accept", "application/json")
            .with_form(form)
            .with_timeout_ms(self.timeout_ms)
    }
}

impl TokenSource for ClientCredentialsProvider {
    fn acquire_token<'a>(
        &'a self,
        credentials: &'a Credentials,
        scope: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Token, AuthError>> + Send + 'a>> {
        Box::pin(async move {
            let request = self.build_request(credentials, scope);
            debug!(token_url = %self.token_url, client_id = credentials.client_id(), "requesting bearer token");

            let response = execute_with_retry(self.http_client.as_ref(), &request, &self.retry)
                .await
                .map_err(|error| {
                    warn!(token_url = %self.token_url, error = %error, "token exchange transport failed");
                    AuthError::Transport(error.message().to_string())
                })?;

            if !response.is_success() {
                warn!(token_url = %self.token_url, status = response.status, "token endpoint rejected credentials");
                return Err(AuthError::Status {
                    status: response.status,
                });
            }

            let token = Token::from_response_body(&response.body, OffsetDateTime::now_utc())?;
            info!(
                token_url = %self.token_url,
                expires_at = ?token.expires_at(),
                "acquired bearer token"
            );
            Ok(token)
        })
    }
}

/// Owns the bearer token used by one harvest.
pub struct TokenSession {
    source: Arc<dyn TokenSource>,
    credentials: Credentials,
    scope: Option<String>,
    refresh_margin: Duration,
    cached: RwLock<Option<Token>>,
    acquisitions: AtomicU64,
}

impl TokenSession {
    pub fn new(source: Arc<dyn TokenSource>, credentials: Credentials, scope: Option<String>) -> Self {
        Self {
            source,
            credentials,
            scope,
            refresh_margin: Duration::seconds(30),
            cached: RwLock::new(None),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Treat tokens as expired this long before their reported expiry.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Number of token exchanges performed so far.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Returns a valid token, acquiring a new one when needed.
    pub async fn current(&self) -> Result<Token, AuthError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|token| self.is_fresh(token)) {
                return Ok(token.clone());
            }
        }

        let mut cached = self.cached.write().await;
        // Another caller may have refreshed while we waited for the write lock.
        if let Some(token) = cached.as_ref().filter(|token| self.is_fresh(token)) {
            return Ok(token.clone());
        }

        let token = self.acquire().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Replaces `rejected` after the server refused it (HTTP 401).
    ///
    /// If another caller already replaced it, the newer token is returned
    /// without a second exchange.
    pub async fn refresh_if_current(&self, rejected: &Token) -> Result<Token, AuthError> {
        let mut cached = self.cached.write().await;
        if let Some(token) = cached.as_ref() {
            if token.access_token() != rejected.access_token() && self.is_fresh(token) {
                return Ok(token.clone());
            }
        }

        let token = self.acquire().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    fn is_fresh(&self, token: &Token) -> bool {
        token.is_valid_at(OffsetDateTime::now_utc(), self.refresh_margin)
    }

    async fn acquire(&self) -> Result<Token, AuthError> {
        let token = self
            .source
            .acquire_token(&self.credentials, self.scope.as_deref())
            .await?;
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        Ok(token)
    }
}

impl Debug for TokenSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSession")
            .field("client_id", &self.credentials.client_id())
            .field("scope", &self.scope)
            .field("refresh_margin", &self.refresh_margin)
            .field("acquisitions", &self.acquisitions())
            .finish()
    }
}
