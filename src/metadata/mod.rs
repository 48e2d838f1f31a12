//! Social-preview metadata for pasted links.
//!
//! [`fetch_page_metadata`] fetches a page with a browser `User-Agent` and
//! scrapes its Open Graph tags via [`extract_metadata`].

mod scrape;

use std::time::Duration;

use futures::StreamExt;
use reqwest::redirect::Policy;
use thiserror::Error;

use crate::catalog::PageMetadata;
use crate::util::{normalize_link, validate_url};

pub use scrape::{extract_metadata, NO_TITLE};

/// Desktop Chrome identity; some sites serve bare pages to unknown agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Errors that can occur while fetching page metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The URL failed validation (SSRF, bad scheme, etc.)
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// HTTP request failed
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Server answered with a non-success status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request and body together exceeded the timeout
    #[error("request timed out")]
    Timeout,
    /// Response body exceeded the 5MB size limit
    #[error("response too large")]
    TooLarge,
}

/// HTTP client for outbound page fetches.
///
/// Pooled and keepalive-enabled like any long-lived client, with a redirect
/// policy that re-validates every hop.
pub fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(Duration::from_secs(30))
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        // SEC-016: a public page must not bounce the fetch onto a private host.
        if let Err(e) = validate_url(attempt.url().as_str()) {
            tracing::warn!(to = %attempt.url(), error = %e, "Refusing redirect");
            return attempt.error(format!("Redirect target rejected: {e}"));
        }

        tracing::debug!(
            to = %attempt.url(),
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Fetches `url` and extracts its preview metadata.
///
/// The link is normalized first (`example.com/a` becomes
/// `https://example.com/a`) and must pass SSRF validation. `timeout` bounds
/// the whole exchange, body included.
///
/// # Errors
///
/// Returns [`MetadataError`] on validation failure, network error, non-2xx
/// status, timeout or oversized body.
pub async fn fetch_page_metadata(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<PageMetadata, MetadataError> {
    let link = normalize_link(url);
    let validated = validate_url(&link).map_err(|e| MetadataError::InvalidUrl(e.to_string()))?;
    fetch_unchecked(client, validated.as_str(), timeout).await
}

/// Fetch and scrape without URL validation. Callers validate first.
pub(crate) async fn fetch_unchecked(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<PageMetadata, MetadataError> {
    let exchange = async {
        let response = client
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::HttpStatus(status.as_u16()));
        }

        read_page_bytes(response).await
    };

    let bytes = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| MetadataError::Timeout)??;

    let html = String::from_utf8_lossy(&bytes);
    Ok(extract_metadata(&html, url))
}

/// Reads the body with a 5MB size limit using stream-based reading.
async fn read_page_bytes(response: reqwest::Response) -> Result<Vec<u8>, MetadataError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > MAX_PAGE_SIZE {
            return Err(MetadataError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(MetadataError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > MAX_PAGE_SIZE {
            return Err(MetadataError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
