use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How an error should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// 429 from the upstream API - retry after the full backoff delay
    RateLimited,
    /// Timeout or 5xx - retry after the full backoff delay
    Transient,
    /// Anything else - fail immediately
    Fatal,
}

/// Exponential backoff with a small random jitter: delay for attempt `n`
/// is `base * 2^n` plus up to `max_jitter`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Retry attempts after the initial one
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(10));
        let jitter_ms = if self.max_jitter.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.max_jitter.as_millis() as u64)
        };
        exp + Duration::from_millis(jitter_ms)
    }
}

/// Run `operation` until it succeeds, the error classifies as fatal, or the
/// retry budget is exhausted. The final error is returned unchanged.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &BackoffPolicy,
    classify: impl Fn(&E) -> RetryClass,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Operation succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                let class = classify(&e);
                if class == RetryClass::Fatal {
                    error!("Operation failed with non-retryable error: {}", e);
                    return Err(e);
                }
                if attempt >= policy.max_retries {
                    error!(
                        "Operation failed after {} attempts, giving up: {}",
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    "Operation failed (attempt {}/{}, {:?}): {} - retrying in {}ms",
                    attempt + 1,
                    policy.max_retries + 1,
                    class,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
