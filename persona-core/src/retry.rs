use crate::error::{CoreError, LlmError, RedditApiError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Retry behaviour injected into the Reddit fetcher and the persona requester.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn reddit() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 2000,
            max_delay_ms: 60000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }

    /// Gemini free-tier limits reset per minute, so waits can be long.
    pub fn gemini() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5000,
            max_delay_ms: 60000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after the delay the server asked for
    RetryWithDelay(Duration),
    /// Permanent failure
    NoRetry,
}

pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error {
        CoreError::RedditApi(reddit_error) => match reddit_error {
            RedditApiError::RateLimitExceeded { retry_after } => match retry_after {
                Some(secs) => RetryStrategy::RetryWithDelay(Duration::from_secs(*secs)),
                None => RetryStrategy::Retry,
            },
            RedditApiError::ServerError { .. } => RetryStrategy::Retry,
            RedditApiError::AuthenticationFailed { .. }
            | RedditApiError::InvalidToken
            | RedditApiError::Forbidden { .. }
            | RedditApiError::UserNotFound { .. }
            | RedditApiError::NoPublicActivity { .. }
            | RedditApiError::InvalidResponse { .. } => RetryStrategy::NoRetry,
        },
        CoreError::Llm(llm_error) => match llm_error {
            LlmError::RateLimitExceeded { retry_after, .. } => match retry_after {
                Some(secs) => RetryStrategy::RetryWithDelay(Duration::from_secs(*secs)),
                None => RetryStrategy::Retry,
            },
            LlmError::ServiceUnavailable { .. } => RetryStrategy::Retry,
            // Quota, auth, filtering and format problems will not fix themselves
            _ => RetryStrategy::NoRetry,
        },
        CoreError::Network(reqwest_error) => {
            if reqwest_error.is_timeout() || reqwest_error.is_connect() {
                RetryStrategy::Retry
            } else {
                RetryStrategy::NoRetry
            }
        }
        CoreError::Timeout { .. } => RetryStrategy::Retry,
        _ => RetryStrategy::NoRetry,
    }
}

impl CoreError {
    /// Whether a retry could succeed. Follows [`get_retry_strategy`].
    pub fn is_retryable(&self) -> bool {
        get_retry_strategy(self) != RetryStrategy::NoRetry
    }
}

/// Exponential backoff with jitter, never above `max_delay_ms`.
pub fn calculate_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let max_delay = policy.max_delay();

    let exponential_delay = if attempt == 0 {
        Duration::from_millis(policy.base_delay_ms)
    } else {
        let multiplier = policy.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (policy.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(policy.max_delay_ms))
    };

    let jitter_range = (exponential_delay.as_millis() as f64 * policy.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);

    (exponential_delay + Duration::from_millis(jitter)).min(max_delay)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
}

#[derive(Debug, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    total_retries: AtomicU64,
    successful_retries: AtomicU64,
    failed_operations: AtomicU64,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails permanently, or the policy's
    /// attempts are used up. The last error is returned unchanged.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut total_delay_ms = 0u64;
        let mut attempt = 0u32;

        loop {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            let start_time = Instant::now();
            let error = match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        self.total_retries.fetch_add(attempt as u64, Ordering::Relaxed);
                        self.successful_retries.fetch_add(1, Ordering::Relaxed);
                        info!(
                            "Operation {} succeeded after {} retries (total delay: {}ms)",
                            operation_name, attempt, total_delay_ms
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            debug!(
                "Attempt {} failed for {} after {:?}: {}",
                attempt + 1,
                operation_name,
                start_time.elapsed(),
                error
            );

            let has_attempts_left = attempt + 1 < max_attempts;
            let delay = match get_retry_strategy(&error) {
                RetryStrategy::Retry if has_attempts_left => {
                    Some(calculate_delay(attempt, &self.policy))
                }
                RetryStrategy::RetryWithDelay(delay) if has_attempts_left => {
                    Some(delay.min(self.policy.max_delay()))
                }
                RetryStrategy::NoRetry => {
                    debug!("Not retrying {} due to error type: {}", operation_name, error);
                    None
                }
                _ => None,
            };

            match delay {
                Some(delay) => {
                    total_delay_ms += delay.as_millis() as u64;
                    warn!("Retrying {} in {:?} due to: {}", operation_name, delay, error);
                    sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    self.total_retries.fetch_add(attempt as u64, Ordering::Relaxed);
                    self.failed_operations.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Operation {} failed after {} attempts with total delay of {}ms: {}",
                        operation_name,
                        attempt + 1,
                        total_delay_ms,
                        error
                    );
                    return Err(error);
                }
            }
        }
    }

    pub fn get_metrics(&self) -> RetryMetrics {
        RetryMetrics {
            total_retries: self.total_retries.load(Ordering::Relaxed),
            successful_retries: self.successful_retries.load(Ordering::Relaxed),
            failed_operations: self.failed_operations.load(Ordering::Relaxed),
        }
    }
}
