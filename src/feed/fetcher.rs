use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::parser::parse_feed;
use super::ParsedFeed;
use crate::net::{read_limited_bytes, BodyError};
use crate::util::{validate_url, HostPolicy};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed document.
///
/// Every variant is fatal to the pipeline run that asked for the feed. None
/// of them is retried here; the caller owns the retry policy.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The feed URL is not an absolute http(s) URL or violates the host policy
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl From<BodyError> for FetchError {
    fn from(e: BodyError) -> Self {
        match e {
            BodyError::Network(e) => FetchError::Network(e),
            BodyError::TooLarge(_) => FetchError::ResponseTooLarge,
            BodyError::Incomplete { expected, received } => {
                FetchError::IncompleteResponse { expected, received }
            }
        }
    }
}

/// Retrieves and parses a feed document.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, feed_url: &str) -> Result<ParsedFeed, FetchError>;
}

/// [`FeedFetcher`] backed by a single HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
    policy: HostPolicy,
}

impl HttpFeedFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            max_bytes: MAX_FEED_SIZE,
            policy: HostPolicy::Public,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_host_policy(mut self, policy: HostPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, feed_url: &str) -> Result<ParsedFeed, FetchError> {
        let url = validate_url(feed_url, self.policy)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        // One deadline covers the request and the body read
        let deadline = tokio::time::Instant::now() + self.timeout;
        let response = tokio::time::timeout_at(deadline, self.client.get(url.clone()).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            tracing::debug!(feed = %url, status = %response.status(), "Feed request rejected");
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = tokio::time::timeout_at(deadline, read_limited_bytes(response, self.max_bytes))
            .await
            .map_err(|_| FetchError::Timeout)??;

        let parsed = parse_feed(&bytes, Some(url.as_str()))
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        tracing::debug!(
            feed = %url,
            entries = parsed.entries.len(),
            bytes = bytes.len(),
            "Fetched feed"
        );

        Ok(parsed)
    }
}
