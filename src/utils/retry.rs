use std::time::{Duration, Instant};
use serde::Deserialize;
use tokio::time::sleep;

// ============================================================================
// Bounded Backoff Retry Strategy
// ============================================================================
//
// Retries transient failures of store transactions and bus publishes.
// A retry loop halts on success, when the attempt count is exhausted, or
// when the elapsed-time budget would be exceeded by the next sleep.
//
// ============================================================================

/// How the delay grows between attempts
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay(n) = initial_delay * multiplier^(n-1)
    Exponential { multiplier: f64 },
    /// delay(n) = initial_delay * fib(n), fib = 1, 1, 2, 3, 5, ...
    Fibonacci,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (the first call included)
    pub max_attempts: u32,
    /// Base delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Total time budget across all attempts
    pub max_elapsed: Option<Duration>,
    pub strategy: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_elapsed: None,
            strategy: BackoffStrategy::Exponential { multiplier: 2.0 },
        }
    }
}

impl RetryConfig {
    /// Fibonacci-weighted backoff bounded by a try count and a time budget
    pub fn fibonacci(max_attempts: u32, max_elapsed: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            max_elapsed: Some(max_elapsed),
            strategy: BackoffStrategy::Fibonacci,
        }
    }

    /// Policy for store transactions: 3 tries within 4 seconds
    pub fn store_default() -> Self {
        Self::fibonacci(3, Duration::from_secs(4))
    }

    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = match self.strategy {
            BackoffStrategy::Exponential { multiplier } => {
                multiplier.powi(attempt.saturating_sub(1) as i32)
            }
            BackoffStrategy::Fibonacci => fibonacci(attempt) as f64,
        };
        let millis = (self.initial_delay.as_millis() as f64) * factor;
        Duration::from_millis(millis as u64).min(self.max_delay)
    }

    fn budget_allows(&self, started: Instant, delay: Duration) -> bool {
        match self.max_elapsed {
            Some(budget) => started.elapsed() + delay <= budget,
            None => true,
        }
    }
}

fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 1..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded
    Success(T),
    /// Operation failed after all retries
    Failed(E),
    /// Operation permanently failed (should not retry)
    PermanentFailure(E),
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed(error) | RetryResult::PermanentFailure(error) => Err(error),
        }
    }
}

/// Check if an error is transient (should retry) or permanent (should not retry)
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Execute an operation, retrying every failure with backoff
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    run(config, operation, |_| true).await
}

/// Execute an operation, retrying only transient failures
pub async fn retry_on_transient<F, Fut, T, E>(
    config: &RetryConfig,
    operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    run(config, operation, |error: &E| error.is_transient()).await
}

async fn run<F, Fut, T, E, R>(
    config: &RetryConfig,
    mut operation: F,
    retryable: R,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let started = Instant::now();
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        tracing::debug!(
            attempt = attempt,
            max_attempts = max_attempts,
            "Attempting operation"
        );

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt = attempt, "Operation succeeded after retry");
                }
                return RetryResult::Success(result);
            }
            Err(error) => {
                if !retryable(&error) {
                    tracing::error!(
                        error = %error,
                        "Permanent failure detected, not retrying"
                    );
                    return RetryResult::PermanentFailure(error);
                }

                let delay = config.delay_for(attempt);

                if attempt >= max_attempts || !config.budget_allows(started, delay) {
                    tracing::error!(
                        attempt = attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %error,
                        "Operation failed after all retries"
                    );
                    return RetryResult::Failed(error);
                }

                tracing::warn!(
                    attempt = attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying after delay"
                );

                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Flaky(bool);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(transient={})", self.0)
        }
    }

    impl IsTransient for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            max_elapsed: None,
            strategy: BackoffStrategy::Fibonacci,
        }
    }

    #[test]
    fn test_fibonacci_delays() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            ..RetryConfig::fibonacci(6, Duration::from_secs(60))
        };

        let delays: Vec<u64> = (1..=6).map(|n| config.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 100, 200, 300, 500, 800]);
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            max_elapsed: None,
            strategy: BackoffStrategy::Exponential { multiplier: 2.0 },
        };

        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_retry_succeeds_eventually() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&fast_config(3), |_attempt| {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err("temporary failure")
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert!(matches!(result, RetryResult::Success("success")));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_fails_after_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&fast_config(2), |_attempt| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("persistent failure") }
        })
        .await;

        assert!(matches!(result, RetryResult::Failed("persistent failure")));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_on_transient(&fast_config(5), |_attempt| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Flaky(false)) }
        })
        .await;

        assert!(matches!(result, RetryResult::PermanentFailure(Flaky(false))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_elapsed_budget_stops_retries() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_millis(30),
            max_delay: Duration::from_millis(30),
            max_elapsed: Some(Duration::from_millis(50)),
            strategy: BackoffStrategy::Fibonacci,
        };
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_on_transient(&config, |_attempt| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Flaky(true)) }
        })
        .await;

        assert!(matches!(result, RetryResult::Failed(_)));
        // 0ms + 30ms fits the budget, 30ms + 30ms does not
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
