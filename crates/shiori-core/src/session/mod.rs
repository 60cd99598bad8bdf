//! Credentialed API client with transparent session refresh.
//!
//! Every request carries the session cookies held by the client's cookie
//! store. When the backend answers 401, the client renews the session once
//! through the refresh endpoint (shared between concurrent callers) and
//! retries the original request once. If renewal fails (rejected or
//! unreachable), invalidation listeners run, the navigator is sent to the
//! login page unless the current page is exempt, and the original 401 is
//! handed back to the caller.

mod cookies;
mod listeners;
mod navigation;
mod refresh;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;

pub use cookies::SessionCookies;
pub use listeners::{InvalidationListeners, ListenerHandle};
pub use navigation::{Navigator, PagePaths};
pub use refresh::{RefreshOutcome, RefreshPhase};

use crate::api::{self, USER_AGENT};
use crate::config::Config;
use crate::error::{FetchError, FetchResult};
use refresh::RefreshCoordinator;

/// Method, headers and body of one API call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Set on the single retry after a refresh; never refreshes again.
    pub(crate) retry: bool,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self::method(Method::POST)
    }

    pub fn put() -> Self {
        Self::method(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::method(Method::DELETE)
    }

    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Serializes `value` as the JSON body.
    ///
    /// # Errors
    /// Returns an error if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> FetchResult<Self> {
        let body = serde_json::to_vec(value).map_err(|e| {
            FetchError::invalid_request("Failed to serialize request body")
                .with_details(e.to_string())
        })?;
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds a header, replacing any earlier value for the same name.
    ///
    /// # Errors
    /// Returns an error if the name or value is not a valid header.
    pub fn header(mut self, name: &str, value: &str) -> FetchResult<Self> {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            FetchError::invalid_request(format!("Invalid header name: {name}"))
                .with_details(e.to_string())
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            FetchError::invalid_request(format!("Invalid value for header {name}"))
                .with_details(e.to_string())
        })?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn is_retry(&self) -> bool {
        self.retry
    }

    fn as_retry(&self) -> Self {
        Self {
            retry: true,
            ..self.clone()
        }
    }
}

/// Connection settings for a [`SessionClient`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// API base URL without trailing slash
    pub base_url: String,
    /// Path of the refresh endpoint
    pub refresh_path: String,
    /// How long a settled refresh outcome is reused
    pub settle_delay: Duration,
    /// Optional client-wide timeout
    pub timeout: Option<Duration>,
    /// Page paths used for redirect decisions
    pub pages: PagePaths,
}

impl SessionSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            refresh_path: api::auth_endpoints::REFRESH.to_string(),
            settle_delay: Duration::from_millis(100),
            timeout: None,
            pages: PagePaths::default(),
        }
    }

    /// Builds settings from config, resolving the base URL (env > config > default).
    ///
    /// # Errors
    /// Returns an error if the configured base URL is malformed.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: config.api_base_url()?,
            refresh_path: config.session.refresh_path.clone(),
            settle_delay: config.session.settle_delay(),
            timeout: config.request_timeout(),
            pages: config.pages.clone(),
        })
    }
}

/// Credentialed API client that renews an expired session once per call.
pub struct SessionClient {
    http: reqwest::Client,
    cookies: Arc<SessionCookies>,
    settings: SessionSettings,
    refresh: RefreshCoordinator,
    listeners: InvalidationListeners,
    navigator: Arc<dyn Navigator>,
}

impl SessionClient {
    /// Creates a client with its own empty cookie store.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed (TLS backend).
    pub fn new(settings: SessionSettings, navigator: Arc<dyn Navigator>) -> FetchResult<Self> {
        Self::with_cookies(settings, navigator, Arc::new(SessionCookies::new()))
    }

    /// Creates a client backed by `cookies`, e.g. a store loaded from disk.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed (TLS backend).
    pub fn with_cookies(
        settings: SessionSettings,
        navigator: Arc<dyn Navigator>,
        cookies: Arc<SessionCookies>,
    ) -> FetchResult<Self> {
        let mut builder = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .user_agent(USER_AGENT);
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            cookies,
            refresh: RefreshCoordinator::new(settings.settle_delay),
            settings,
            listeners: InvalidationListeners::new(),
            navigator,
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Cookies sent with every request and updated from every response.
    pub fn cookies(&self) -> &SessionCookies {
        &self.cookies
    }

    pub fn navigator(&self) -> &dyn Navigator {
        self.navigator.as_ref()
    }

    /// Listeners notified when the session cannot be renewed.
    pub fn listeners(&self) -> &InvalidationListeners {
        &self.listeners
    }

    /// Registers a session-invalidation listener.
    pub fn on_session_invalidated<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.register(listener)
    }

    pub fn refresh_phase(&self) -> RefreshPhase {
        self.refresh.phase()
    }

    /// Resolves an API path against the configured base URL.
    pub fn url(&self, endpoint: &str) -> String {
        api::build_api_url(&self.settings.base_url, endpoint)
    }

    /// [`Self::request`] for a path relative to the base URL.
    ///
    /// # Errors
    /// Returns an error on transport failure.
    pub async fn request_endpoint(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> FetchResult<Response> {
        self.request(&self.url(endpoint), options).await
    }

    /// Sends a credentialed request, renewing the session once on 401.
    ///
    /// Non-401 responses (429 included) come back untouched. After a failed
    /// renewal the original 401 is returned, never a synthesized error.
    ///
    /// # Errors
    /// Returns an error if the initial or retried request fails in transport.
    pub async fn request(&self, url: &str, options: RequestOptions) -> FetchResult<Response> {
        let response = self.dispatch(url, &options).await?;
        if response.status() != StatusCode::UNAUTHORIZED || options.retry {
            return Ok(response);
        }

        let outcome = self.refresh_session().await;
        if outcome.is_renewed() {
            return self.dispatch(url, &options.as_retry()).await;
        }

        // Rejection and an unreachable refresh endpoint both end the session.
        if let RefreshOutcome::Rejected(status) = outcome {
            tracing::warn!(%url, %status, "session refresh rejected; session invalidated");
        } else {
            tracing::warn!(%url, "session refresh failed; session invalidated");
        }
        self.listeners.notify();
        self.redirect_to_login();
        Ok(response)
    }

    /// Renews the session, sharing an in-flight or just-settled refresh.
    pub async fn refresh_session(&self) -> RefreshOutcome {
        self.refresh
            .run(|| {
                let http = self.http.clone();
                let url = self.url(&self.settings.refresh_path);
                async move {
                    match http.post(&url).send().await {
                        Ok(response) if response.status().is_success() => RefreshOutcome::Renewed,
                        Ok(response) => RefreshOutcome::Rejected(response.status()),
                        Err(err) => {
                            tracing::warn!(%url, error = %err, "session refresh request failed");
                            RefreshOutcome::Unreachable
                        }
                    }
                }
                .boxed()
            })
            .await
    }

    /// Sends a credentialed request with no refresh handling.
    ///
    /// # Errors
    /// Returns an error on transport failure.
    pub async fn send_plain(&self, url: &str, options: &RequestOptions) -> FetchResult<Response> {
        let mut builder = self
            .http
            .request(options.method.clone(), url)
            .headers(merge_headers(&options.headers));
        if let Some(body) = &options.body {
            builder = builder.body(body.clone());
        }
        Ok(builder.send().await?)
    }

    async fn dispatch(&self, url: &str, options: &RequestOptions) -> FetchResult<Response> {
        let response = self.send_plain(url, options).await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(%url, "rate limited (429)");
        }
        Ok(response)
    }

    /// Sends the navigator to the login page unless the current page is exempt.
    pub(crate) fn redirect_to_login(&self) {
        let current = self.navigator.current_path();
        if !self.settings.pages.is_redirect_exempt(&current) {
            self.navigator.redirect(&self.settings.pages.login);
        }
    }
}

/// JSON content type by default; caller headers replace defaults of the same name.
fn merge_headers(overrides: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.extend(overrides.clone());
    headers
}
