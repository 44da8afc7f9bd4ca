//! HTTP fetcher implementation
//!
//! This module handles all page requests for the crawler, including:
//! - Building the HTTP client with the configured user agent
//! - GET requests with a per-request timeout
//! - Following redirects (max 10 hops)
//! - Classifying failures so the worker can decide between retry and give-up

use crate::config::UserAgentConfig;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Maximum number of redirects followed for a single request
pub const MAX_REDIRECTS: usize = 10;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// The server answered with a 2xx status, or a 3xx that was not followed
    Success(FetchedPage),

    /// The request failed or the server answered with an error status
    Failure(FailureKind),
}

/// A successfully fetched response
#[derive(Debug)]
pub struct FetchedPage {
    pub status: u16,

    /// URL after following redirects
    pub final_url: Url,

    pub headers: HeaderMap,

    pub body: String,
}

impl FetchedPage {
    /// Content-Type header value, if present and readable
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Returns true if the response declares an HTML body
    pub fn is_html(&self) -> bool {
        self.content_type().is_some_and(is_html_content_type)
    }
}

/// Classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request did not complete within the timeout
    Timeout,

    /// DNS, connect, TLS or body transfer failure
    ConnectionError,

    /// Non-2xx status that is not a rate-limit signal
    HttpError { code: u16 },

    /// Redirect chain exceeded the limit
    TooManyRedirects,

    /// 429 or 403, treated as "slow down"
    RateLimited { code: u16 },
}

impl FailureKind {
    /// Returns true if the task should be retried after backing off
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionError | Self::RateLimited { .. }
        )
    }

    /// HTTP status associated with the failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpError { code } | Self::RateLimited { code } => Some(*code),
            _ => None,
        }
    }

    /// Classifies a non-2xx status code
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN => Self::RateLimited {
                code: status.as_u16(),
            },
            _ => Self::HttpError {
                code: status.as_u16(),
            },
        }
    }

    /// Classifies a transport error
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_redirect() {
            Self::TooManyRedirects
        } else {
            Self::ConnectionError
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::ConnectionError => write!(f, "connection error"),
            Self::HttpError { code } => write!(f, "HTTP {}", code),
            Self::TooManyRedirects => write!(f, "too many redirects"),
            Self::RateLimited { code } => write!(f, "rate limited (HTTP {})", code),
        }
    }
}

/// Returns true for `text/html` and `application/xhtml+xml`
pub fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::UserAgentConfig;
/// use sumi_harvest::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiHarvest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx, unfollowed 3xx (e.g. 304) | `Success` |
/// | 429, 403 | `RateLimited` (retryable) |
/// | other 4xx/5xx | `HttpError` |
/// | Timeout | `Timeout` (retryable) |
/// | Connect/TLS/body error | `ConnectionError` (retryable) |
/// | Redirect chain > 10 | `TooManyRedirects` |
pub async fn fetch_page(client: &Client, url: &Url, timeout: Duration) -> FetchResult {
    let response = match client.get(url.as_str()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("Request to {} failed: {}", url, e);
            return FetchResult::Failure(FailureKind::from_reqwest(&e));
        }
    };

    let status = response.status();
    if !(status.is_success() || status.is_redirection()) {
        return FetchResult::Failure(FailureKind::from_status(status));
    }

    let final_url = response.url().clone();
    let headers = response.headers().clone();

    match response.text().await {
        Ok(body) => FetchResult::Success(FetchedPage {
            status: status.as_u16(),
            final_url,
            headers,
            body,
        }),
        Err(e) => {
            tracing::debug!("Reading body of {} failed: {}", url, e);
            FetchResult::Failure(FailureKind::from_reqwest(&e))
        }
    }
}
