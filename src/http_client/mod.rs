//! Page fetching with bounded retry, readable-text extraction and content hashing.

mod user_agent;

pub use user_agent::{resolve_user_agent, USER_AGENT};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::rate_limit::{parse_retry_after, RetryPolicy};
use crate::utils::html::{extract_readable_text, extract_readable_text_with_base};

/// Errors raised while fetching a source page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Status {
        status: u16,
        url: String,
        retry_after: Option<Duration>,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("no readable content at {url}")]
    Empty { url: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Transient failures: rate limiting, server errors, connection trouble.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request() || source.is_body()
            }
            Self::Empty { .. } | Self::Client(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// SHA-256 (hex) over the link-stripped readable text of a page.
///
/// Never computed over raw markup, so script, attribute and link churn
/// does not register as a content change.
pub fn content_hash(raw_html: &str) -> String {
    hash_text(&extract_readable_text(raw_html, false))
}

fn hash_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// A fetched page, rendered for extraction and hashed for change detection.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub url: String,
    /// Readable text with link targets inline.
    pub text: String,
    pub content_hash: String,
}

impl FetchedPage {
    pub fn from_html(url: &str, html: &str) -> Self {
        let base = Url::parse(url).ok();
        let text = extract_readable_text_with_base(html, base.as_ref(), true);
        Self {
            url: url.to_string(),
            text,
            content_hash: content_hash(html),
        }
    }
}

/// Anything that can produce a [`FetchedPage`] for a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// HTTP page fetcher sharing one connection pool across concurrent tasks.
#[derive(Clone)]
pub struct ContentFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl ContentFetcher {
    /// Create a fetcher with its own client.
    pub fn new(user_agent: Option<&str>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(resolve_user_agent(user_agent))
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self::with_client(client))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            policy: RetryPolicy::FETCH,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET a URL and return the body, retrying transient failures.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && self.policy.allows_retry(attempt) => {
                    let wait = match &e {
                        FetchError::Status {
                            retry_after: Some(after),
                            ..
                        } => (*after).min(self.policy.cap),
                        _ => self.policy.delay_for(attempt - 1),
                    };
                    warn!(
                        "Fetch of {} failed (attempt {}/{}): {}; retrying in {:?}",
                        url, attempt, self.policy.max_attempts, e, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    warn!("Fetch of {} failed after {} attempt(s): {}", url, attempt, e);
                    return Err(e);
                }
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                retry_after,
            });
        }

        response.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl PageFetcher for ContentFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let html = self.fetch(url).await?;
        let page = FetchedPage::from_html(url, &html);
        if page.text.trim().is_empty() {
            return Err(FetchError::Empty {
                url: url.to_string(),
            });
        }
        debug!(
            "Fetched {} ({} chars readable, hash {})",
            url,
            page.text.chars().count(),
            &page.content_hash[..8]
        );
        Ok(page)
    }
}
