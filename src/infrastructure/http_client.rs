//! HTTP client with rate limiting and error handling
//!
//! Shared client for every outbound call the importer makes. The rate
//! limiter protects the commerce platform API from request bursts during
//! the fan-out stages.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client, RequestBuilder, Response,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use serde::de::DeserializeOwned;

use crate::infrastructure::config::AdvancedConfig;

/// HTTP client configuration
#[derive(Debug, Clone, serde::Serialize)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
    pub follow_redirects: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("catfeed/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 30,
            max_requests_per_second: 20,
            follow_redirects: true,
        }
    }
}

impl HttpClientConfig {
    pub fn from_advanced(advanced: &AdvancedConfig) -> Self {
        Self {
            timeout_seconds: advanced.request_timeout_seconds,
            max_requests_per_second: advanced.max_requests_per_second,
            ..Default::default()
        }
    }
}

/// Rate-limited HTTP client shared across the import pipeline
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .context("Rate limit must be greater than 0")?,
        );
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            config,
        })
    }

    /// Access the underlying client to compose a request; pass it back
    /// through [`HttpClient::send`] so the rate limiter is applied.
    pub fn request(&self, method: reqwest::Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send a composed request after waiting for the rate limiter. The
    /// response status is not checked; callers that branch on specific
    /// statuses inspect it themselves.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.rate_limiter.until_ready().await;
        request.send().await.context("HTTP request failed")
    }

    /// Fetch a URL with rate limiting, failing on non-success statuses
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.rate_limiter.until_ready().await;

        tracing::debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "HTTP request failed with status {}: {}",
                response.status(),
                url
            );
        }

        Ok(response)
    }

    /// Fetch a URL and deserialize the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode JSON body from: {url}"))
    }

    /// HEAD a URL and return its Content-Type, if the server reports one.
    /// Used to probe image URLs before media creation.
    pub async fn head_content_type(&self, url: &str) -> Result<Option<String>> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .head(url)
            .send()
            .await
            .with_context(|| format!("Failed to probe URL: {url}"))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(content_type)
    }

    /// Get the configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}
