//! Rate-limited executor for generative-model calls
//!
//! Every call acquires one permit from a process-wide limiter, then runs the
//! request under the retry policy. Only throttling (`RateLimit`) is retried;
//! anything else propagates on first occurrence.

use delve_core::{
    retry_with_policy, ChatMessage, ChatProvider, ChatRequest, DelveConfig, DelveError,
    DelveResult, ModelConfig, RateLimiter, RetryPolicy,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct RateLimitedExecutor {
    provider: Arc<dyn ChatProvider>,
    limiter: RateLimiter,
    policy: RetryPolicy,
    model: ModelConfig,
}

impl std::fmt::Debug for RateLimitedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedExecutor")
            .field("provider", &self.provider.name())
            .field("limiter", &self.limiter)
            .field("policy", &self.policy)
            .field("model", &self.model)
            .finish()
    }
}

impl RateLimitedExecutor {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        limiter: RateLimiter,
        policy: RetryPolicy,
        model: ModelConfig,
    ) -> Self {
        Self {
            provider,
            limiter,
            policy,
            model,
        }
    }

    pub fn from_config(provider: Arc<dyn ChatProvider>, config: &DelveConfig) -> Self {
        Self::new(
            provider,
            RateLimiter::new(config.executor.max_concurrent),
            config.executor.retry_policy(),
            config.llm.model_config(),
        )
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Execute with the executor's default model settings
    pub async fn execute(&self, messages: Vec<ChatMessage>) -> DelveResult<String> {
        self.execute_request(ChatRequest {
            messages,
            model: self.model.clone(),
        })
        .await
    }

    /// Execute one request.
    ///
    /// Fails with `RateLimit` once retries are exhausted, or with the first
    /// non-throttling error.
    pub async fn execute_request(&self, request: ChatRequest) -> DelveResult<String> {
        let _permit = self.limiter.acquire().await?;
        let started = Instant::now();

        let result = retry_with_policy(
            &self.policy,
            "chat_completion",
            |e| matches!(e, DelveError::RateLimit { .. }),
            || self.provider.generate(&request),
        )
        .await;

        match &result {
            Ok(text) => debug!(
                provider = self.provider.name(),
                model = %request.model.model,
                chars = text.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Generation completed"
            ),
            Err(e) => warn!(
                provider = self.provider.name(),
                kind = e.kind(),
                error = %e,
                "Generation failed"
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use delve_core::{rate_limit_error, ErrorContext};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Throttles the first `throttled` calls, then answers
    struct ThrottledProvider {
        throttled: usize,
        calls: AtomicUsize,
    }

    impl ThrottledProvider {
        fn new(throttled: usize) -> Self {
            Self {
                throttled,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for ThrottledProvider {
        async fn generate(&self, _request: &ChatRequest) -> DelveResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.throttled {
                Err(rate_limit_error!("429 Too Many Requests", "test"))
            } else {
                Ok("{\"ok\":true}".to_string())
            }
        }
    }

    struct BrokenProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatProvider for BrokenProvider {
        async fn generate(&self, _request: &ChatRequest) -> DelveResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DelveError::Upstream {
                message: "500 Internal Server Error".to_string(),
                status: Some(500),
                provider: None,
                context: ErrorContext::new("test"),
            })
        }
    }

    /// Answers after `delay`, recording the peak number of overlapping calls
    struct SlowProvider {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowProvider {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for SlowProvider {
        async fn generate(&self, _request: &ChatRequest) -> DelveResult<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("done".to_string())
        }
    }

    /// Run `calls` concurrent requests through a limiter of `max_concurrent`
    /// and return the provider's peak in-flight count
    async fn peak_in_flight(max_concurrent: usize, calls: usize) -> usize {
        let provider = Arc::new(SlowProvider::new(Duration::from_millis(50)));
        let executor = RateLimitedExecutor::new(
            provider.clone(),
            RateLimiter::new(max_concurrent),
            policy(),
            ModelConfig::new("test-model"),
        );

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..calls {
            let executor = executor.clone();
            tasks.spawn(async move {
                executor
                    .execute(vec![ChatMessage::user(format!("call {}", i))])
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            assert_eq!(joined.unwrap().unwrap(), "done");
        }

        assert_eq!(executor.limiter().available_permits(), max_concurrent);
        provider.peak.load(Ordering::SeqCst)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::no_jitter(5, Duration::from_millis(1_000), Duration::from_millis(30_000))
    }

    fn executor(provider: Arc<dyn ChatProvider>) -> RateLimitedExecutor {
        RateLimitedExecutor::new(
            provider,
            RateLimiter::new(1),
            policy(),
            ModelConfig::new("test-model"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retries_throttling_with_exponential_backoff() {
        let provider = Arc::new(ThrottledProvider::new(4));
        let executor = executor(provider.clone());
        let started = tokio::time::Instant::now();

        let response = executor.execute(vec![ChatMessage::user("hi")]).await.unwrap();

        assert_eq!(response, "{\"ok\":true}");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
        // 1s + 2s + 4s + 8s
        assert!(started.elapsed() >= Duration::from_millis(15_000));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let provider = Arc::new(ThrottledProvider::new(usize::MAX));
        let executor = executor(provider.clone());

        let err = executor
            .execute(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err, DelveError::RateLimit { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn non_throttling_errors_are_not_retried() {
        let provider = Arc::new(BrokenProvider {
            calls: AtomicUsize::new(0),
        });
        let executor = executor(provider.clone());

        let err = executor
            .execute(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err, DelveError::Upstream { status: Some(500), .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permit_is_released_after_each_call() {
        let executor = executor(Arc::new(ThrottledProvider::new(0)));
        executor.execute(vec![ChatMessage::user("a")]).await.unwrap();
        executor.execute(vec![ChatMessage::user("b")]).await.unwrap();
        assert_eq!(executor.limiter().available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn single_permit_serializes_concurrent_calls() {
        assert_eq!(peak_in_flight(1, 6).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_bounds_concurrent_calls() {
        let peak = peak_in_flight(3, 10).await;
        assert!(peak <= 3);
        assert!(peak >= 1);
    }
}
