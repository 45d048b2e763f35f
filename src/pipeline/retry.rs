//! Bounded exponential backoff for upstream calls.

use std::future::Future;

use super::error::ExecutionError;
use crate::config::RetrySettings;

/// The last error of an operation that never succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: ExecutionError,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is reached. Returns the value and the attempts used.
pub async fn with_retry<T, F, Fut>(
    settings: &RetrySettings,
    label: &str,
    mut op: F,
) -> Result<(T, u32), RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExecutionError>>,
{
    let max_attempts = settings.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) if !error.is_retryable() || attempt >= max_attempts => {
                return Err(RetryFailure {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) => {
                let delay = settings.backoff(attempt);
                tracing::warn!(
                    %label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "upstream call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
