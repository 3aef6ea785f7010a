//! Async utilities and patterns
//!
//! Retry policy with exponential backoff, timeouts, bounded worker pools and
//! the semaphore that throttles upstream calls.

use crate::error::{DelveError, DelveResult, ErrorContext};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};

type JitterFn = Arc<dyn Fn() -> Duration + Send + Sync>;

/// Retry policy injected into anything that retries.
///
/// The delay before retry `n` (0-based) is
/// `min(initial_delay * 2^n, max_delay) + jitter()`.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    jitter: JitterFn,
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        jitter: impl Fn() -> Duration + Send + Sync + 'static,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            jitter: Arc::new(jitter),
        }
    }

    /// Uniform random jitter in `[0, max_jitter_ms]`
    pub fn with_random_jitter(
        max_retries: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        max_jitter_ms: u64,
    ) -> Self {
        Self::new(
            max_retries,
            Duration::from_millis(initial_delay_ms),
            Duration::from_millis(max_delay_ms),
            move || Duration::from_millis(fastrand::u64(0..=max_jitter_ms)),
        )
    }

    pub fn no_jitter(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self::new(max_retries, initial_delay, max_delay, || Duration::ZERO)
    }

    pub fn with_fixed_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Arc::new(move || jitter);
        self
    }

    /// Backoff without jitter for 0-based retry `attempt`
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_delay(attempt) + (self.jitter)()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_random_jitter(5, 1_000, 30_000, 1_000)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

/// Per-invocation retry bookkeeping; never shared between calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_delay: Duration,
}

/// Run `operation`, retrying errors accepted by `is_retryable` under `policy`.
///
/// Non-retryable errors are returned immediately. After `max_retries` retries
/// the last error is returned unchanged.
pub async fn retry_with_policy<F, Fut, T, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: P,
    mut operation: F,
) -> DelveResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DelveResult<T>>,
    P: Fn(&DelveError) -> bool,
{
    let mut state = RetryState::default();

    loop {
        debug!(
            operation = operation_name,
            attempt = state.attempt + 1,
            max_retries = policy.max_retries,
            "Attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if state.attempt > 0 {
                    debug!(
                        operation = operation_name,
                        retries = state.attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !is_retryable(&err) => return Err(err),
            Err(err) => {
                if state.attempt >= policy.max_retries {
                    error!(
                        operation = operation_name,
                        retries = state.attempt,
                        error = %err,
                        "Operation failed after all retry attempts"
                    );
                    return Err(err);
                }

                // server hints raise the delay but never past max_delay
                let mut delay = policy.backoff_for(state.attempt);
                if let Some(server_ms) = err.retry_delay_ms() {
                    delay = delay.max(Duration::from_millis(server_ms).min(policy.max_delay));
                }

                warn!(
                    operation = operation_name,
                    attempt = state.attempt + 1,
                    kind = err.kind(),
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                sleep(delay).await;
                state = RetryState {
                    attempt: state.attempt + 1,
                    last_delay: delay,
                };
            }
        }
    }
}

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(future: F, timeout_ms: u64, operation_name: &str) -> DelveResult<T>
where
    F: Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(DelveError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_metadata("timeout_ms", &timeout_ms.to_string())
                .with_suggestion("Increase timeout duration")
                .with_suggestion("Check network connectivity"),
        }),
    }
}

/// Concurrent processing with controlled parallelism.
///
/// Results come back in completion order. A panicking task is reported as an
/// `Internal` error in its slot and does not affect the others.
pub async fn process_concurrently<T, R, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    processor: F,
) -> Vec<DelveResult<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = DelveResult<R>> + Send + 'static,
{
    use futures::stream::{self, StreamExt};

    stream::iter(items)
        .map(|item| {
            let processor = processor.clone();
            tokio::spawn(async move { processor(item).await })
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(|join_result| match join_result {
            Ok(result) => result,
            Err(join_error) => Err(DelveError::Internal {
                message: format!("Task join error: {}", join_error),
                source: Some(Box::new(join_error)),
                context: ErrorContext::new("async_utils")
                    .with_operation("process_concurrently")
                    .with_suggestion("Check for panics in concurrent tasks"),
            }),
        })
        .collect()
}

/// Process-wide cap on in-flight upstream calls
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Wait for a permit; the permit is released when the guard drops
    pub async fn acquire(&self) -> DelveResult<RateLimitGuard> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| DelveError::Internal {
                message: format!("Failed to acquire rate limit permit: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("rate_limiter").with_operation("acquire"),
            })?;

        Ok(RateLimitGuard { _permit: permit })
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// RAII guard for rate limiter permits
pub struct RateLimitGuard {
    _permit: OwnedSemaphorePermit,
}
