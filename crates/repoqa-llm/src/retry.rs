use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Timeout and backoff settings applied to one logical provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one. `0` disables retries.
    pub max_retries: u32,
    pub base_backoff: Duration,
    /// Deadline for a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for the given zero-based attempt, capped at 30s.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Wait before retrying after `err`: the server's `Retry-After` when
    /// given, else [`Self::backoff`]. Both are capped at 30s.
    #[must_use]
    pub fn delay_for(&self, err: &LlmError, attempt: u32) -> Duration {
        err.retry_after()
            .map_or_else(|| self.backoff(attempt), |wait| wait.min(MAX_BACKOFF))
    }
}

/// Parse a `Retry-After` header given in whole seconds.
pub(crate) fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    let value = response.headers().get(reqwest::header::RETRY_AFTER)?;
    let secs = value.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}

/// Run `f` under `policy`, retrying transient failures.
///
/// Each attempt is bounded by `policy.timeout`. A timed-out attempt counts as
/// a transient failure. Waits as long as [`RetryPolicy::delay_for`] says.
///
/// # Errors
///
/// Returns the first non-transient error, or the last transient error once
/// `max_retries` is exhausted.
pub async fn call_with_retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(policy.timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                seconds: policy.timeout.as_secs(),
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(&e, attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "transient failure, retrying: {e}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
