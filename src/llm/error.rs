//! Errors raised by LLM backends and the extraction client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Failed to reach the provider
    #[error("connection error: {0}")]
    Connection(String),
    /// Provider-side failure or overload
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Account balance or quota exhausted
    #[error("quota exhausted: {0}")]
    Quota(String),
    #[error("request rejected (HTTP {status}): {message}")]
    BadRequest { status: u16, message: String },
    /// Response did not match the extraction schema
    #[error("response failed validation: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = summarize_body(body);
        match status {
            401 | 403 => Self::Auth(message),
            402 => Self::Quota(message),
            // Gemini reports an exhausted quota as 429 RESOURCE_EXHAUSTED
            429 if body.contains("RESOURCE_EXHAUSTED") => Self::Quota(message),
            429 => Self::RateLimited {
                message,
                retry_after,
            },
            500..=599 => Self::Server { status, message },
            _ => Self::BadRequest { status, message },
        }
    }

    /// Transient failures that warrant another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Server { .. } | Self::RateLimited { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// First 300 characters of an error body, whitespace collapsed.
fn summarize_body(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(300) {
        Some((idx, _)) => format!("{}...", &collapsed[..idx]),
        None => collapsed,
    }
}
