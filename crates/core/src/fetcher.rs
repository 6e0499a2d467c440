use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::rate_limiter::{RateLimiter, host_of};

/// Rotated on every retry.
pub static USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("403 Forbidden from {url} after {attempts} attempts")]
    Forbidden { url: String, attempts: u32 },
    #[error("HTTP status {status} from {url} after {attempts} attempts")]
    Status {
        url: String,
        status: StatusCode,
        attempts: u32,
    },
    #[error("request to {url} failed after {attempts} attempts: {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Total attempts per URL; values below 1 behave as 1.
    pub max_retries: u32,
    /// Retry `n` waits `retry_delay * (n + 1)`.
    pub retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl FetchOptions {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }
}

pub fn build_http_client(timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(USER_AGENTS[0])
        .gzip(true)
        .brotli(true)
        .http2_adaptive_window(true)
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(2)
        .timeout(timeout)
        .build()
        .map_err(FetchError::Client)
}

enum Failure {
    Forbidden,
    Status(StatusCode),
    Transport(reqwest::Error),
}

async fn get_with_retry(
    client: &Client,
    url: &str,
    options: &FetchOptions,
    limiter: Option<&RateLimiter>,
) -> Result<Response, FetchError> {
    let attempts = options.max_retries.max(1);
    let host = host_of(url);
    let mut last: Option<Failure> = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let wait = options.retry_delay * (attempt + 1);
            debug!(url = %url, wait_ms = wait.as_millis() as u64, "waiting before retry");
            sleep(wait).await;
        }
        if let Some(limiter) = limiter {
            limiter.wait_for_host(&host).await;
        }

        let user_agent = USER_AGENTS[attempt as usize % USER_AGENTS.len()];
        info!(url = %url, attempt = attempt + 1, of = attempts, "fetching");
        let resp = client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await;

        match resp {
            Ok(r) if r.status() == StatusCode::OK => return Ok(r),
            Ok(r) if r.status() == StatusCode::FORBIDDEN => {
                warn!(url = %url, attempt = attempt + 1, "403 Forbidden");
                last = Some(Failure::Forbidden);
            }
            Ok(r) => {
                warn!(url = %url, status = %r.status(), attempt = attempt + 1, "unexpected status");
                last = Some(Failure::Status(r.status()));
            }
            Err(e) => {
                warn!(url = %url, error = %e, attempt = attempt + 1, "request failed");
                last = Some(Failure::Transport(e));
            }
        }
    }

    let url = url.to_string();
    Err(match last {
        Some(Failure::Forbidden) => FetchError::Forbidden { url, attempts },
        Some(Failure::Status(status)) => FetchError::Status {
            url,
            status,
            attempts,
        },
        Some(Failure::Transport(source)) => FetchError::Transport {
            url,
            attempts,
            source,
        },
        // at least one attempt always runs
        None => FetchError::Forbidden { url, attempts },
    })
}

/// Fetch a page body as text.
pub async fn fetch_page(
    client: &Client,
    url: &str,
    options: &FetchOptions,
    limiter: Option<&RateLimiter>,
) -> Result<String, FetchError> {
    let resp = get_with_retry(client, url, options, limiter).await?;
    let body = resp.text().await.map_err(|source| FetchError::Transport {
        url: url.to_string(),
        attempts: options.max_retries.max(1),
        source,
    })?;
    info!(url = %url, bytes = body.len(), "retrieved page");
    Ok(body)
}

/// Fetch a binary resource such as an image.
pub async fn fetch_bytes(
    client: &Client,
    url: &str,
    options: &FetchOptions,
    limiter: Option<&RateLimiter>,
) -> Result<Vec<u8>, FetchError> {
    let resp = get_with_retry(client, url, options, limiter).await?;
    let bytes = resp.bytes().await.map_err(|source| FetchError::Transport {
        url: url.to_string(),
        attempts: options.max_retries.max(1),
        source,
    })?;
    Ok(bytes.to_vec())
}
