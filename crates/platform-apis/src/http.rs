//! Shared REST transport for the admin API clients.
//!
//! Every client wraps a [`RestClient`], which handles authentication, the
//! retry policy for transient failures, and the dry-run gate: read calls
//! always go out, mutating calls are only logged when dry-run is enabled.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::retry::RetryPolicy;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How requests authenticate against the API.
#[derive(Debug, Clone, Default)]
pub enum Auth {
    /// No authentication (credentials travel in the body, e.g. KASM).
    #[default]
    None,
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// HTTP basic authentication.
    Basic { username: String, password: String },
    /// A custom header such as `PRIVATE-TOKEN` or `X-Vault-Token`.
    Header { name: &'static str, value: String },
}

/// Options shared by every client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Accept self-signed certificates (typical for fresh clusters).
    pub insecure_tls: bool,
    /// Log mutating calls instead of sending them.
    pub dry_run: bool,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            insecure_tls: false,
            dry_run: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response body as text.
    pub body: String,
    /// `Location` header, if present.
    pub location: Option<String>,
}

impl RawResponse {
    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| {
            warn!(error = %e, body = %self.body, "Failed to parse response");
            ApiError::Serialization(e)
        })
    }

    /// Last path segment of the `Location` header (the id of a created object).
    #[must_use]
    pub fn location_id(&self) -> Option<&str> {
        self.location
            .as_deref()
            .and_then(|l| l.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
    }
}

enum Body<'a> {
    Empty,
    Json(&'a serde_json::Value),
    Form(&'a [(&'a str, &'a str)]),
}

/// Authenticated REST client with retry and dry-run support.
#[derive(Debug)]
pub struct RestClient {
    service: &'static str,
    base_url: String,
    http: Client,
    auth: RwLock<Auth>,
    options: ClientOptions,
}

impl RestClient {
    /// Create a new client for `service` rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is empty or the HTTP client cannot be built.
    pub fn new(
        service: &'static str,
        base_url: impl Into<String>,
        auth: Auth,
        options: ClientOptions,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::Config(format!("{service}: base URL is empty")));
        }

        let http = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.insecure_tls)
            .build()?;

        Ok(Self {
            service,
            base_url,
            http,
            auth: RwLock::new(auth),
            options,
        })
    }

    /// Service name used in logs and errors.
    #[must_use]
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether mutating calls are suppressed.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Replace the credentials used for subsequent requests.
    pub fn set_auth(&self, auth: Auth) {
        *self.auth.write().unwrap_or_else(PoisonError::into_inner) = auth;
    }

    /// GET a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or invalid JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::GET, path, Body::Empty).await?.json()
    }

    /// GET a JSON document, mapping 404 to `None`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx/404 status, or invalid JSON.
    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ApiError> {
        let response = self.execute(Method::GET, path, Body::Empty).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.check(response)?.json().map(Some)
    }

    /// HEAD a resource: 2xx is `true`, 404 is `false`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or any other status.
    pub async fn exists(&self, path: &str) -> Result<bool, ApiError> {
        let response = self.execute(Method::HEAD, path, Body::Empty).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.check(response).map(|_| true)
    }

    /// POST a form and parse the JSON answer. Used for token endpoints, which
    /// do not change server state and therefore run even in dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or invalid JSON.
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.send(Method::POST, path, Body::Form(form)).await?.json()
    }

    /// POST a JSON body to a read-only endpoint (RPC-style APIs such as KASM).
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or invalid JSON.
    pub async fn query<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, Body::Json(&body)).await?.json()
    }

    /// Issue a mutating call. Returns `None` without touching the network in
    /// dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-2xx status.
    pub async fn mutate<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<RawResponse>, ApiError> {
        if self.options.dry_run {
            info!(service = self.service, %method, path, "[dry-run] Skipping mutating call");
            return Ok(None);
        }

        let response = match body {
            Some(body) => {
                let body = serde_json::to_value(body)?;
                self.send(method, path, Body::Json(&body)).await?
            }
            None => self.send(method, path, Body::Empty).await?,
        };
        Ok(Some(response))
    }

    async fn send(&self, method: Method, path: &str, body: Body<'_>) -> Result<RawResponse, ApiError> {
        let response = self.execute(method, path, body).await?;
        self.check(response)
    }

    fn check(&self, response: RawResponse) -> Result<RawResponse, ApiError> {
        if response.status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::Api {
                service: self.service,
                status: response.status.as_u16(),
                message: response.body,
            })
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let auth = self.auth.read().unwrap_or_else(PoisonError::into_inner);
        match &*auth {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Header { name, value } => request.header(*name, value),
        }
    }

    async fn execute(&self, method: Method, path: &str, body: Body<'_>) -> Result<RawResponse, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let retry = &self.options.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(service = self.service, %method, url = %url, attempt, "Request");

            let mut request = self.authorize(self.http.request(method.clone(), &url));
            request = match &body {
                Body::Empty => request,
                Body::Json(value) => request.json(value),
                Body::Form(form) => request.form(form),
            };

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if RetryPolicy::is_retryable_status(status) && retry.should_retry(attempt) {
                        let delay = retry.delay_for_attempt(attempt - 1);
                        warn!(
                            service = self.service,
                            status = status.as_u16(),
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "Transient HTTP status, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .map(ToString::to_string);
                    let body = response.text().await?;
                    return Ok(RawResponse {
                        status,
                        body,
                        location,
                    });
                }
                Err(e) if RetryPolicy::is_retryable_error(&e) && retry.should_retry(attempt) => {
                    let delay = retry.delay_for_attempt(attempt - 1);
                    warn!(service = self.service, error = %e, attempt, "Transport error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Percent-encode a single path segment (e.g. a GitLab `group/project` path).
///
/// Spaces become `%20`; `/` is escaped so the value stays one segment.
#[must_use]
pub fn encode_segment(segment: &str) -> String {
    let Ok(mut url) = url::Url::parse("http://segment.invalid/") else {
        return segment.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(segment);
    }
    url.path().trim_start_matches('/').to_string()
}

/// Encode a query-string value (`+` for space, `+` itself escaped).
#[must_use]
pub fn encode_query(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_id() {
        let response = RawResponse {
            status: StatusCode::CREATED,
            body: String::new(),
            location: Some(
                "https://kc.example.com/admin/realms/platform/clients/1b2c-3d4e".to_string(),
            ),
        };
        assert_eq!(response.location_id(), Some("1b2c-3d4e"));

        let response = RawResponse {
            status: StatusCode::CREATED,
            body: String::new(),
            location: None,
        };
        assert_eq!(response.location_id(), None);
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("platform/argocd"), "platform%2Fargocd");
        assert_eq!(encode_segment("simple"), "simple");
    }

    #[test]
    fn test_encode_segment_keeps_spaces_out_of_plus() {
        assert_eq!(encode_segment("dev team"), "dev%20team");
        assert_eq!(encode_segment("a+b"), "a+b");
        assert_eq!(encode_query("dev team"), "dev+team");
        assert_eq!(encode_query("alice+ops@example.com"), "alice%2Bops%40example.com");
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let err = RestClient::new("vault", "", Auth::None, ClientOptions::default()).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = RestClient::new(
            "gitlab",
            "https://gitlab.example.com/",
            Auth::None,
            ClientOptions::default(),
        )
        .unwrap();
        assert_eq!(client.base_url(), "https://gitlab.example.com");
    }
}
