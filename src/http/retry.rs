//! Retry policy for network operations.

use reqwest::StatusCode;

/// Maximum number of attempts for a network operation.
pub const MAX_RETRIES: usize = 3;

/// Delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// HTTP failures that will not succeed on retry.
///
/// Each variant carries the requested URL so the final error message points
/// at the archive that could not be fetched.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 429, or 403 mentioning a rate limit
    RateLimitExceeded(String),
    /// HTTP 401
    AuthenticationFailed(String),
    /// HTTP 404
    NotFound(String),
    /// HTTP 403
    Forbidden(String),
    /// Any other 4xx
    ClientError(u16, String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::RateLimitExceeded(url) => {
                write!(f, "Rate limit exceeded while fetching {}. Try again later.", url)
            }
            NonRetryableError::AuthenticationFailed(url) => {
                write!(f, "Authentication required to fetch {}", url)
            }
            NonRetryableError::NotFound(url) => write!(f, "Not found: {}", url),
            NonRetryableError::Forbidden(url) => write!(f, "Access forbidden: {}", url),
            NonRetryableError::ClientError(status, url) => {
                write!(f, "Request error: HTTP {} for {}", status, url)
            }
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Classifies an error as retryable (`Ok`) or non-retryable (`Err`).
///
/// Connection errors and 5xx responses are retryable; 4xx are not.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        return Ok(());
    };
    let url = error
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "<unknown url>".to_string());

    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationFailed(url)),
        StatusCode::FORBIDDEN => {
            if error.to_string().contains("rate limit") {
                Err(NonRetryableError::RateLimitExceeded(url))
            } else {
                Err(NonRetryableError::Forbidden(url))
            }
        }
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimitExceeded(url)),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(url)),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(s.as_u16(), url)),
        _ => Ok(()),
    }
}

/// Maps an error from `error_for_status()` to either the original (retryable)
/// error or a [`NonRetryableError`].
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}
