use std::future::Future;
use std::time::Duration;

use crate::config::ApiSettings;
use crate::error::GatewayError;

/// Bounded retry with exponential backoff for transient gateway failures.
///
/// Non-transient errors (auth, rejections) return immediately without a
/// retry. Rate-limit errors wait at least `rate_limit_floor` before the
/// next attempt so backoff never undercuts the exchange's pacing.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit_floor: Duration,
}

impl RetryPolicy {
    pub fn from_settings(api: &ApiSettings) -> Self {
        Self {
            max_attempts: api.max_retries.max(1),
            base_delay: Duration::from_millis(api.retry_base_delay_ms),
            rate_limit_floor: Duration::from_millis(api.rate_limit_floor_ms),
        }
    }

    /// Delay before attempt `attempt + 1` (attempts are zero-indexed)
    fn delay_for(&self, attempt: u32, rate_limited: bool) -> Duration {
        let backoff = self.base_delay * 2u32.saturating_pow(attempt);
        if rate_limited {
            backoff.max(self.rate_limit_floor)
        } else {
            backoff
        }
    }
}

/// Run `operation` under `policy`, retrying transient failures.
///
/// Returns the last error once attempts are exhausted; the caller decides
/// whether exhaustion is fatal for its phase of the order lifecycle.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt, err.is_rate_limited());
                tracing::warn!(
                    %label,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    tracing::error!(%label, attempts = policy.max_attempts, error = %err, "retries exhausted");
                } else {
                    tracing::error!(%label, error = %err, "non-retryable failure");
                }
                return Err(err);
            }
        }
    }
}
