//! The origin API client.
//!
//! [`ApiClient`] issues authenticated calls against the site base URL,
//! paces them through the shared [`RateLimiter`], and retries transient
//! failures according to its [`RetryPolicy`]. Retry bookkeeping lives in a
//! [`RetryState`] local to each call, so concurrent callers never share it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_RATE_LIMIT_MS, LOGIN_PATTERNS, READ_TIMEOUT_SECS};
use super::error::RequestError;
use super::rate_limiter::{RateLimiter, parse_retry_after};
use super::retry::{RetryDecision, RetryPolicy, RetryState};
use super::site::endpoint_url;
use crate::auth::Credentials;
use crate::user_agent;

/// Configuration for an [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Site base URL, including any context path.
    pub base_url: Url,
    /// Capability attached to origin requests.
    pub credentials: Credentials,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub read_timeout: Duration,
    /// Retry policy for transient failures.
    pub retry_policy: RetryPolicy,
    /// Minimum spacing between requests to one host (zero disables).
    pub rate_limit: Duration,
    /// Cancels pending retry waits when the run is aborted.
    pub cancel: CancellationToken,
}

impl ClientConfig {
    /// Creates a config with default timeouts, retries and pacing.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            credentials: Credentials::Anonymous,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            retry_policy: RetryPolicy::default(),
            rate_limit: Duration::from_millis(DEFAULT_RATE_LIMIT_MS),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sets the minimum request spacing.
    #[must_use]
    pub fn rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Sets connect and read timeouts.
    #[must_use]
    pub fn timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Sets the cancellation token observed while waiting to retry.
    #[must_use]
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A successful response, fully buffered.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: u16,
    /// Final URL after redirects.
    pub url: Url,
    /// Declared Content-Type, if any.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
    /// Attempts it took, including the successful one.
    pub attempts: u32,
    /// Total time spent waiting between attempts.
    pub waited: Duration,
}

impl ApiResponse {
    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Decode`] when the body is not the expected document.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| RequestError::decode(self.url.as_str(), e.to_string()))
    }

    /// Number of retries performed before success.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Request counters for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestStats {
    /// Requests sent, including retries.
    pub requests: u64,
    /// Retries scheduled.
    pub retries: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    retries: AtomicU64,
}

#[derive(Debug)]
struct ClientInner {
    origin: Client,
    external: Client,
    base_url: Url,
    credentials: Credentials,
    retry_policy: RetryPolicy,
    rate_limiter: RateLimiter,
    cancel: CancellationToken,
    counters: Counters,
}

/// Client for the origin REST API.
///
/// Cheap to clone; all clones share connection pools, pacing state and
/// counters.
///
/// # Example
///
/// ```no_run
/// use exporter_core::client::{ApiClient, ClientConfig, normalize_site};
/// use reqwest::Method;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::new(ClientConfig::new(normalize_site("acme")?))?;
/// let response = client.request(Method::GET, "/rest/api/space", &[("limit", "1")], None).await?;
/// println!("{} after {} attempt(s)", response.status, response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error when the TLS backend cannot be initialized.
    #[instrument(skip_all, fields(base_url = %config.base_url, auth = config.credentials.kind()))]
    pub fn new(config: ClientConfig) -> Result<Self, reqwest::Error> {
        let mut origin = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .gzip(true)
            .user_agent(user_agent::origin_user_agent());
        if let Some(jar) = config.credentials.cookie_jar() {
            origin = origin.cookie_provider(jar);
        }
        let external = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .gzip(true)
            .user_agent(user_agent::external_user_agent())
            .build()?;

        debug!("origin client ready");
        Ok(Self {
            inner: Arc::new(ClientInner {
                origin: origin.build()?,
                external,
                base_url: config.base_url,
                credentials: config.credentials,
                retry_policy: config.retry_policy,
                rate_limiter: RateLimiter::new(config.rate_limit),
                cancel: config.cancel,
                counters: Counters::default(),
            }),
        })
    }

    /// The site base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The retry policy in effect.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry_policy
    }

    /// Counters accumulated across all clones.
    #[must_use]
    pub fn stats(&self) -> RequestStats {
        RequestStats {
            requests: self.inner.counters.requests.load(Ordering::Relaxed),
            retries: self.inner.counters.retries.load(Ordering::Relaxed),
        }
    }

    /// Issues an API request relative to the base URL and expects JSON back.
    ///
    /// `params` are appended to the query string; `path` may also be an
    /// absolute URL on the same site (pagination `next` links).
    ///
    /// # Errors
    ///
    /// Returns the last [`RequestError`] once retries are exhausted, or the
    /// first non-retryable one.
    #[instrument(skip(self, method, params, body), fields(method = %method))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, RequestError> {
        let mut url = endpoint_url(&self.inner.base_url, path)?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        self.send_with_retry(Target::Api, method, url, body).await
    }

    /// GETs `path` and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request), plus [`RequestError::Decode`].
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, RequestError> {
        self.request(Method::GET, path, params, None).await?.json()
    }

    /// Downloads a binary resource.
    ///
    /// With `authenticated` the origin credentials are attached; external
    /// resources are fetched with a credential-free client.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] on failure; a login-page redirect is reported
    /// as [`RequestError::AuthExpired`].
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_binary(&self, url: &Url, authenticated: bool) -> Result<ApiResponse, RequestError> {
        let target = if authenticated { Target::Binary } else { Target::External };
        self.send_with_retry(target, Method::GET, url.clone(), None).await
    }

    async fn send_with_retry(
        &self,
        target: Target,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, RequestError> {
        let mut state = RetryState::new();
        loop {
            let attempt = state.record_attempt();
            self.inner.rate_limiter.acquire(url.as_str()).await;
            self.inner.counters.requests.fetch_add(1, Ordering::Relaxed);

            let error = match self.send_once(target, method.clone(), &url, body).await {
                Ok(mut response) => {
                    response.attempts = attempt;
                    response.waited = state.total_wait();
                    return Ok(response);
                }
                Err(error) => error,
            };

            let failure = error.classify();
            let delay = match self.inner.retry_policy.should_retry(failure, attempt) {
                RetryDecision::Retry { delay, .. } => delay,
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url = %url, attempt, reason = %reason, "giving up");
                    return Err(error);
                }
            };

            let delay = match &error {
                RequestError::Throttled { retry_after, .. } => {
                    let hinted = retry_after.as_deref().and_then(parse_retry_after);
                    let delay = hinted.unwrap_or(delay);
                    self.inner.rate_limiter.record_rate_limit(url.as_str(), delay);
                    delay
                }
                _ => delay,
            };

            warn!(
                url = %url,
                attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "request failed, retry scheduled"
            );
            self.inner.counters.retries.fetch_add(1, Ordering::Relaxed);
            state.record_failure(failure, delay);

            tokio::select! {
                () = self.inner.cancel.cancelled() => {
                    return Err(RequestError::Cancelled { url: url.to_string() });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn send_once(
        &self,
        target: Target,
        method: Method,
        url: &Url,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, RequestError> {
        let client = match target {
            Target::External => &self.inner.external,
            Target::Api | Target::Binary => &self.inner.origin,
        };
        let mut request = client.request(method, url.clone());
        if target != Target::External {
            request = self.inner.credentials.apply(request);
        }
        if target == Target::Api {
            request = request.header(ACCEPT, "application/json");
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RequestError::transport(url.as_str(), &e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(RequestError::from_status(url.as_str(), status.as_u16(), retry_after));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_html = content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));

        if target != Target::External && is_html && is_login_url(&final_url) {
            return Err(RequestError::auth_expired(
                url.as_str(),
                format!("redirected to login page {final_url}"),
            ));
        }
        if target == Target::Api && is_html {
            return Err(RequestError::auth_expired(
                url.as_str(),
                "HTML page returned where JSON was expected",
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RequestError::transport(url.as_str(), &e))?
            .to_vec();

        Ok(ApiResponse {
            status: status.as_u16(),
            url: final_url,
            content_type,
            body,
            attempts: 0,
            waited: Duration::ZERO,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// JSON API call with credentials.
    Api,
    /// Attachment download with credentials.
    Binary,
    /// Third-party resource without credentials.
    External,
}

fn is_login_url(url: &Url) -> bool {
    let lowered = url.as_str().to_ascii_lowercase();
    LOGIN_PATTERNS.iter().any(|pattern| lowered.contains(pattern))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_client(server: &MockServer) -> ApiClient {
        fast_client_with(server, Credentials::Anonymous)
    }

    fn fast_client_with(server: &MockServer, credentials: Credentials) -> ApiClient {
        let policy = RetryPolicy::with_max_attempts(3)
            .base_delay(Duration::from_millis(10))
            .max_jitter(Duration::from_millis(5));
        let config = ClientConfig::new(Url::parse(&server.uri()).unwrap())
            .credentials(credentials)
            .retry_policy(policy)
            .rate_limit(Duration::ZERO);
        ApiClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_request_appends_params_and_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/space"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = fast_client(&server);
        let value: serde_json::Value = client.get_json("/rest/api/space", &[("limit", "1")]).await.unwrap();
        assert!(value["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_retries_5xx_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1"})))
            .mount(&server)
            .await;

        let client = fast_client(&server);
        let response = client.request(Method::GET, "/rest/api/content/1", &[], None).await.unwrap();
        assert_eq!(response.attempts, 2);
        assert_eq!(client.stats().retries, 1);
    }

    #[tokio::test]
    async fn test_request_404_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/9"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = fast_client(&server);
        let error = client.request(Method::GET, "/rest/api/content/9", &[], None).await.unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn test_request_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/1"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = fast_client(&server);
        let error = client.request(Method::GET, "/rest/api/content/1", &[], None).await.unwrap_err();
        assert!(matches!(error, RequestError::Transient { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_request_401_is_auth_expired_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = fast_client(&server);
        let error = client.request(Method::GET, "/rest/api/space", &[], None).await.unwrap_err();
        assert!(error.is_auth_expired());
    }

    #[tokio::test]
    async fn test_html_where_json_expected_is_auth_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>Log in</body></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let client = fast_client(&server);
        let error = client.request(Method::GET, "/rest/api/space", &[], None).await.unwrap_err();
        assert!(error.is_auth_expired(), "got {error:?}");
    }

    #[tokio::test]
    async fn test_binary_login_redirect_is_auth_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/attachments/1/a.png"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/login.action?os_destination=x", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/login.action"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html>login</html>", "text/html"),
            )
            .mount(&server)
            .await;

        let client = fast_client(&server);
        let url = Url::parse(&format!("{}/download/attachments/1/a.png", server.uri())).unwrap();
        let error = client.fetch_binary(&url, true).await.unwrap_err();
        assert!(error.is_auth_expired(), "got {error:?}");
    }

    #[tokio::test]
    async fn test_bearer_credentials_attached_to_origin_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/space"))
            .and(header("Authorization", "Bearer pat-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = fast_client_with(
            &server,
            Credentials::Bearer(crate::auth::SecretToken::new("pat-123")),
        );
        client.request(Method::GET, "/rest/api/space", &[], None).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_interrupts_retry_wait() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let config = ClientConfig::new(Url::parse(&server.uri()).unwrap())
            .retry_policy(RetryPolicy::with_max_attempts(5).base_delay(Duration::from_secs(30)))
            .rate_limit(Duration::ZERO)
            .cancel_token(cancel.clone());
        let client = ApiClient::new(config).unwrap();

        cancel.cancel();
        let error = client.request(Method::GET, "/rest/api/space", &[], None).await.unwrap_err();
        assert!(matches!(error, RequestError::Cancelled { .. }));
    }
}
