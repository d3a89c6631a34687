//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the archiver, including:
//! - Building the HTTP client with the portal credential attached
//! - Retrying transient failures with exponential backoff
//! - Classifying every failure as transient, permanent or malformed

use crate::config::{CrawlerConfig, PortalConfig};
use crate::{ArchiveError, ConfigError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Path fragment of the portal's login page; landing there means the session expired
const LOGIN_PATH_MARKER: &str = "/login/";

/// A fetched document
#[derive(Debug, Clone)]
pub struct Document {
    /// Final URL after redirects
    pub url: Url,
    /// HTTP status code
    pub status_code: u16,
    /// Raw body bytes, exactly as received
    pub body: Vec<u8>,
}

/// Classified fetch failure
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection error, timeout or 5xx that persisted through every attempt
    #[error("transient failure for {url} after {attempts} attempt(s): {message}")]
    Transient {
        url: String,
        attempts: u32,
        message: String,
    },

    /// 4xx, expired session or an unusable request; never retried
    #[error("permanent failure for {url}: {message}")]
    Permanent {
        url: String,
        status_code: Option<u16>,
        message: String,
    },

    /// The response arrived but cannot be a portal document
    #[error("malformed response from {url}: {message}")]
    Malformed { url: String, message: String },
}

/// Outcome of a single attempt
enum AttemptError {
    Retryable(String),
    Fatal(FetchError),
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// Builds an HTTP client that sends the portal credential with every request
///
/// # Arguments
///
/// * `portal` - Portal location and credential
/// * `crawler` - Timeout settings
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(ArchiveError)` - Bad credential header or client construction failure
pub fn build_http_client(
    portal: &PortalConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, ArchiveError> {
    let mut headers = HeaderMap::new();

    if let Some(credential) = portal.resolved_credential() {
        let name = HeaderName::from_bytes(portal.credential_header.trim().as_bytes()).map_err(
            |e| ConfigError::Validation(format!("invalid credential-header: {}", e)),
        )?;
        let mut value = HeaderValue::from_str(credential.trim())
            .map_err(|e| ConfigError::Validation(format!("invalid credential: {}", e)))?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }

    let client = Client::builder()
        .user_agent(concat!("lms-archive/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .timeout(Duration::from_secs(crawler.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Authenticated fetcher with retry
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    retry: RetryPolicy,
}

impl FetchClient {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn from_config(portal: &PortalConfig, crawler: &CrawlerConfig) -> Result<Self, ArchiveError> {
        let client = build_http_client(portal, crawler)?;
        Ok(Self::new(client, RetryPolicy::from_config(crawler)))
    }

    /// Fetches a URL with classification and retry
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Connection error / timeout | Retry with backoff |
    /// | HTTP 5xx | Retry with backoff |
    /// | HTTP 4xx | Immediate → Permanent |
    /// | Redirected to login page | Immediate → Permanent |
    /// | Empty body | Immediate → Malformed |
    ///
    /// Once attempts run out, the last retryable failure becomes `Transient`.
    pub async fn fetch(&self, url: &Url) -> Result<Document, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(url = %url, attempt, "Fetching");

            match self.attempt(url).await {
                Ok(document) => return Ok(document),
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::Retryable(message)) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(FetchError::Transient {
                            url: url.to_string(),
                            attempts: attempt,
                            message,
                        });
                    }
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        url = %url,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        "Attempt failed ({}), retrying in {:?}",
                        message,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, url: &Url) -> Result<Document, AttemptError> {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return Err(classify_send_error(url, e)),
        };

        let status = response.status();
        let final_url = response.url().clone();

        if status.is_server_error() {
            return Err(AttemptError::Retryable(format!("HTTP {}", status.as_u16())));
        }

        if status.is_client_error() {
            return Err(AttemptError::Fatal(FetchError::Permanent {
                url: url.to_string(),
                status_code: Some(status.as_u16()),
                message: describe_status(status),
            }));
        }

        if !status.is_success() {
            return Err(AttemptError::Fatal(FetchError::Permanent {
                url: url.to_string(),
                status_code: Some(status.as_u16()),
                message: format!("unexpected HTTP {}", status.as_u16()),
            }));
        }

        if final_url.path().contains(LOGIN_PATH_MARKER) {
            return Err(AttemptError::Fatal(FetchError::Permanent {
                url: url.to_string(),
                status_code: Some(status.as_u16()),
                message: format!("redirected to login page {}; session expired?", final_url),
            }));
        }

        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => return Err(AttemptError::Retryable(format!("body read failed: {}", e))),
        };

        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(AttemptError::Fatal(FetchError::Malformed {
                url: url.to_string(),
                message: "empty response body".to_string(),
            }));
        }

        Ok(Document {
            url: final_url,
            status_code: status.as_u16(),
            body,
        })
    }
}

fn classify_send_error(url: &Url, e: reqwest::Error) -> AttemptError {
    if e.is_builder() {
        AttemptError::Fatal(FetchError::Permanent {
            url: url.to_string(),
            status_code: None,
            message: e.to_string(),
        })
    } else if e.is_timeout() {
        AttemptError::Retryable("request timeout".to_string())
    } else if e.is_connect() {
        AttemptError::Retryable(format!("connection failed: {}", e))
    } else {
        AttemptError::Retryable(e.to_string())
    }
}

fn describe_status(status: StatusCode) -> String {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            format!("HTTP {}; credential rejected", status.as_u16())
        }
        StatusCode::NOT_FOUND => "HTTP 404; entity does not exist".to_string(),
        _ => format!("HTTP {}", status.as_u16()),
    }
}
