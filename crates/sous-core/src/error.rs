use std::time::Duration;

use thiserror::Error;

use crate::rate_limit::Upstream;

/// Application-wide error types for Sous.
///
/// `Clone` so that a single outcome can be released to every caller waiting
/// on the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// The upstream definitively has no match for the query.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local admission denied by the rate limiter.
    #[error(
        "Rate limit exceeded for {upstream} upstream, retry after {} seconds",
        .retry_after.as_secs()
    )]
    RateLimited {
        upstream: Upstream,
        retry_after: Duration,
    },

    /// Timeout or transport failure talking to an upstream.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream answered with a definitive refusal (bad credentials, bad request).
    #[error("Upstream rejected the request (HTTP {status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    /// The completion API produced output that could not be used, even after a corrective retry.
    #[error("Malformed upstream output: {0}")]
    MalformedUpstreamOutput(String),

    /// Configuration problem, including a query the active provider cannot serve.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The inbound query itself is unusable.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl AppError {
    /// Returns true if this error is transient and worth one more attempt.
    ///
    /// Only transport-level failures qualify. Rate limiting is local and is
    /// never retried by the core.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::UpstreamUnavailable(_))
    }

    /// Retry-after hint for rate-limited errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
