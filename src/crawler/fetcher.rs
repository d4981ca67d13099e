//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - The [`Fetcher`] seam the orchestrator and robots engine fetch through
//! - A reqwest-backed implementation with manual redirect handling
//! - Retry with exponential backoff for transient failures
//! - Error classification into [`NetworkError`]

use crate::config::{defaults, CrawlConfig};
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Transport-level fetch failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("Redirect loop detected at {0}")]
    RedirectLoop(String),

    #[error("Invalid redirect location: {0}")]
    InvalidRedirect(String),

    #[error("Network error: {0}")]
    Other(String),
}

impl NetworkError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connect(_) | Self::Other(_))
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// One hop of a followed redirect chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    pub status_code: u16,
}

/// Per-request options derived from the live crawl configuration
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub user_agent: String,
    pub accept_language: String,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    /// Bodies beyond this many bytes are truncated
    pub max_body_bytes: u64,
}

impl FetchOptions {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            timeout: config.timeout_duration(),
            follow_redirects: config.follow_redirects,
            max_redirects: defaults::MAX_REDIRECTS,
            max_body_bytes: config.max_file_size,
        }
    }
}

/// A completed HTTP exchange (any status code)
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
    /// URL that produced the final response
    pub final_url: Url,
    pub content_type: Option<String>,
    pub redirect_chain: Vec<RedirectHop>,
    pub elapsed: Duration,
    /// Bytes received, before any truncation
    pub size_bytes: u64,
    pub truncated: bool,
}

impl FetchResponse {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map_or(true, |ct| ct.to_ascii_lowercase().contains("html"))
    }
}

/// The HTTP collaborator the crawl fetches through
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> Result<FetchResponse, NetworkError>;
}

/// Builds the shared HTTP client
///
/// Redirects are disabled at the client level and followed by
/// [`HttpFetcher`] so that every hop is recorded.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, NetworkError> {
        let client = build_http_client().map_err(|e| NetworkError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn read_body(
        mut response: reqwest::Response,
        limit: u64,
    ) -> Result<(Vec<u8>, u64, bool), NetworkError> {
        let mut body = Vec::new();
        let mut received: u64 = 0;
        let mut truncated = false;

        while let Some(chunk) = response.chunk().await? {
            received += chunk.len() as u64;
            if truncated {
                continue;
            }
            let room = limit.saturating_sub(body.len() as u64) as usize;
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
            } else {
                body.extend_from_slice(&chunk);
            }
        }

        Ok((body, received, truncated))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> Result<FetchResponse, NetworkError> {
        let started = Instant::now();
        let mut current = url.clone();
        let mut chain: Vec<RedirectHop> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(current.to_string());

        loop {
            let response = self
                .client
                .get(current.clone())
                .header(header::USER_AGENT, &options.user_agent)
                .header(header::ACCEPT_LANGUAGE, &options.accept_language)
                .timeout(options.timeout)
                .send()
                .await?;

            let status = response.status();

            if options.follow_redirects && status.is_redirection() {
                if let Some(location) = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                {
                    let next = current
                        .join(location)
                        .map_err(|_| NetworkError::InvalidRedirect(location.to_string()))?;

                    chain.push(RedirectHop {
                        url: current.to_string(),
                        status_code: status.as_u16(),
                    });

                    if chain.len() > options.max_redirects {
                        return Err(NetworkError::TooManyRedirects(options.max_redirects));
                    }
                    if !visited.insert(next.to_string()) {
                        return Err(NetworkError::RedirectLoop(next.to_string()));
                    }

                    tracing::trace!("Redirect {} -> {}", current, next);
                    current = next;
                    continue;
                }
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            let (bytes, size_bytes, truncated) =
                Self::read_body(response, options.max_body_bytes).await?;

            return Ok(FetchResponse {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
                final_url: current,
                content_type,
                redirect_chain: chain,
                elapsed: started.elapsed(),
                size_bytes,
                truncated,
            });
        }
    }
}

/// Fetches with the configured retry budget
///
/// Retryable network errors and 5xx responses are retried up to `retries`
/// extra times with exponential backoff starting at `backoff`. The last
/// 5xx response is returned as-is once the budget is spent.
pub async fn fetch_with_retries(
    fetcher: &dyn Fetcher,
    url: &Url,
    options: &FetchOptions,
    retries: u32,
    backoff: Duration,
) -> Result<FetchResponse, NetworkError> {
    let mut attempt: u32 = 0;

    loop {
        let result = fetcher.fetch(url, options).await;
        let can_retry = attempt < retries;

        match result {
            Ok(response) if response.status >= 500 && can_retry => {
                tracing::debug!(
                    "HTTP {} from {} (attempt {}/{}), retrying",
                    response.status,
                    url,
                    attempt + 1,
                    retries + 1
                );
            }
            Err(e) if e.is_retryable() && can_retry => {
                tracing::debug!(
                    "{} for {} (attempt {}/{}), retrying",
                    e,
                    url,
                    attempt + 1,
                    retries + 1
                );
            }
            other => return other,
        }

        let factor = 1u32 << attempt.min(16);
        tokio::time::sleep(backoff.saturating_mul(factor)).await;
        attempt += 1;
    }
}
