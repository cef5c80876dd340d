//! HTTP client for marketplace pages and the remote data API
//!
//! Retries transient failures with exponential backoff and honours
//! `Retry-After` on 429/503.

use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ResolutionError, ResolutionResult};
use crate::extraction::Page;
use crate::infrastructure::config::HttpConfig;

/// Configuration for HTTP client behavior
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout_seconds: u64,
    /// Attempts per request, including the first
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub retry_delay_ms: u64,
    pub user_agent: String,
    pub follow_redirects: bool,
}

impl HttpClientConfig {
    pub fn from_http_config(config: &HttpConfig) -> Self {
        Self {
            timeout_seconds: config.timeout_seconds,
            max_retries: config.max_retries.max(1),
            retry_delay_ms: config.retry_delay_ms,
            user_agent: config.user_agent.clone(),
            follow_redirects: true,
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::from_http_config(&HttpConfig::default())
    }
}

/// HTTP client with retry and error mapping
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    /// Optional context label for provenance in logs (e.g. "sandbox:walmart")
    context_label: Option<String>,
}

impl HttpClient {
    pub fn from_http_config(config: &HttpConfig) -> ResolutionResult<Self> {
        Self::with_config(HttpClientConfig::from_http_config(config))
    }

    pub fn with_config(config: HttpClientConfig) -> ResolutionResult<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| ResolutionError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            context_label: None,
        })
    }

    #[must_use]
    pub fn with_context_label(mut self, label: &str) -> Self {
        self.context_label = Some(label.to_string());
        self
    }

    pub const fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Fetch a page and keep its final URL (after redirects)
    pub async fn fetch_page(&self, url: &Url) -> ResolutionResult<Page> {
        let response = self.fetch_response_with_policy(url.as_str()).await?;
        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| http_error(0, &e.to_string(), url.as_str()))?;

        if html.trim().is_empty() {
            return Err(http_error(0, "empty response body", url.as_str()));
        }
        debug!("Fetched {} bytes from {}", html.len(), final_url);
        Ok(Page::new(final_url, html))
    }

    /// GET with retry policy based on HTTP status codes and network errors
    pub async fn fetch_response_with_policy(&self, url: &str) -> ResolutionResult<Response> {
        let mut last_err = None;

        for attempt in 1..=self.config.max_retries {
            match &self.context_label {
                Some(label) => info!("HTTP GET (attempt {}/{}, {}): {}", attempt, self.config.max_retries, label, url),
                None => info!("HTTP GET (attempt {}/{}): {}", attempt, self.config.max_retries, url),
            }

            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    warn!("HTTP error {} on attempt {}: {}", status, attempt, url);

                    if is_retryable(status) && attempt < self.config.max_retries {
                        let retry_after = resp
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok());
                        sleep(self.backoff(attempt, retry_after)).await;
                        last_err = Some(http_error(status.as_u16(), status.canonical_reason().unwrap_or("error"), url));
                        continue;
                    }
                    return Err(http_error(status.as_u16(), status.canonical_reason().unwrap_or("error"), url));
                }
                Err(e) => {
                    warn!("Network error on attempt {}: {}", attempt, e);
                    last_err = Some(http_error(e.status().map_or(0, |s| s.as_u16()), &e.to_string(), url));
                    if attempt < self.config.max_retries {
                        sleep(self.backoff(attempt, None)).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| http_error(0, "no attempt made", url)))
    }

    /// POST a JSON body and decode a JSON response, without retry
    pub async fn post_json<B, R>(&self, url: &str, body: &B, bearer: Option<&str>, timeout: Duration) -> ResolutionResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(url).json(body).timeout(timeout);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| http_error(e.status().map_or(0, |s| s.as_u16()), &e.to_string(), url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(http_error(status.as_u16(), status.canonical_reason().unwrap_or("error"), url));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| http_error(status.as_u16(), &format!("invalid JSON body: {e}"), url))
    }

    /// `retry_delay_ms * 2^(attempt-1)`, raised to `Retry-After` when the server asks for longer
    pub fn backoff(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let exponential = self
            .config
            .retry_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
        let requested = retry_after_secs.map_or(0, |secs| secs.saturating_mul(1000));
        Duration::from_millis(exponential.max(requested))
    }
}

pub fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::INTERNAL_SERVER_ERROR
    )
}

fn http_error(status: u16, message: &str, url: &str) -> ResolutionError {
    ResolutionError::Http {
        status,
        message: message.to_string(),
        url: url.to_string(),
    }
}
