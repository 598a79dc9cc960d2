//! Bounded upstream calls: a timeout ceiling per attempt and at most one retry
//! for transient failures.

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Timeout and retry settings for calls to one upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Ceiling for a single attempt.
    pub timeout: Duration,
    /// Pause before the single retry.
    pub retry_delay: Duration,
}

impl CallPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            retry_delay: Duration::from_millis(250),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Run `attempt`, retrying once if it fails with a retryable error.
    ///
    /// An attempt that exceeds the timeout counts as `UpstreamUnavailable`.
    pub async fn run<T, F, Fut>(&self, what: &str, mut attempt: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        match self.once(what, attempt()).await {
            Err(e) if e.is_retryable() => {
                tracing::warn!(upstream = what, error = %e, "Transient upstream failure, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                self.once(what, attempt()).await
            }
            other => other,
        }
    }

    async fn once<T, Fut>(&self, what: &str, fut: Fut) -> Result<T, AppError>
    where
        Fut: Future<Output = Result<T, AppError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(AppError::UpstreamUnavailable(format!(
                    "{what} timed out after {}s",
                    self.timeout.as_secs_f32()
                )))
            })
    }
}
