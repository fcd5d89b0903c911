//! Shared HTTP plumbing for the feed fetcher and the page scraper.

use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use crate::util::{validate_url, HostPolicy};

pub const DEFAULT_USER_AGENT: &str = concat!("gracile/", env!("CARGO_PKG_VERSION"));

/// Failure while reading a response body under a size cap.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Response too large (exceeds {0} bytes)")]
    TooLarge(usize),
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    Incomplete { expected: u64, received: usize },
}

const MAX_REDIRECTS: usize = 5;

/// Builds the client shared by every network collaborator.
///
/// Per-request deadlines are applied by the callers with
/// `tokio::time::timeout_at`; the connect timeout here only bounds the
/// TCP/TLS handshake. Every redirect hop is checked against `policy`, so a
/// public URL cannot bounce a request onto an internal host.
pub fn build_client(user_agent: &str, policy: HostPolicy) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .redirect(redirect_policy(policy))
        .build()
}

fn redirect_policy(policy: HostPolicy) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error(format!("too many redirects (max {MAX_REDIRECTS})"));
        }
        match validate_url(attempt.url().as_str(), policy) {
            Ok(_) => attempt.follow(),
            Err(e) => {
                tracing::warn!(target_url = %attempt.url(), error = %e, "Refusing redirect");
                attempt.error(e)
            }
        }
    })
}

/// Streams a response body into memory, failing once `limit` bytes would be
/// exceeded or when fewer bytes arrive than Content-Length announced.
pub async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, BodyError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(BodyError::TooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(BodyError::TooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(BodyError::Incomplete {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
