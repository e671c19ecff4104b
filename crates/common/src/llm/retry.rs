//! Bounded exponential-backoff retry for non-streaming completions

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::metrics;
use std::time::Duration;

/// Retry schedule: attempt `k` failing is followed by `base_delay * 2^k`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            base_delay: config.backoff_base(),
        }
    }

    /// Delay after the given 1-indexed failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Total time spent backing off when every attempt fails
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_attempts)
            .map(|attempt| self.delay_after(attempt))
            .sum()
    }
}

/// Run a completion, retrying retryable failures per the policy
///
/// Terminal failures (rejected requests) are returned as-is on the first
/// occurrence. When every attempt fails the last error is wrapped in
/// [`AppError::RetryExhausted`].
pub async fn complete_with_retry(
    model: &dyn LanguageModel,
    request: &CompletionRequest,
    policy: &RetryPolicy,
) -> Result<String> {
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match model.complete(request).await {
            Ok(text) => return Ok(text),
            Err(e) if !e.is_retryable() => {
                tracing::warn!(
                    attempt = attempt,
                    model = %request.model,
                    error = %e,
                    "LLM request rejected, not retrying"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    attempt = attempt,
                    max_retries = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "LLM request failed, backing off"
                );
                metrics::record_llm_retry(model.name());

                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
        }
    }

    Err(AppError::RetryExhausted {
        attempts: policy.max_attempts,
        last_error: Box::new(last_error.unwrap_or_else(|| AppError::Upstream {
            status: None,
            message: "No attempts were made".to_string(),
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TokenStream;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls with the given status
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        status: Option<u16>,
    }

    impl Flaky {
        fn new(failures: u32, status: Option<u16>) -> Self {
            Self { calls: AtomicU32::new(0), failures, status }
        }
    }

    #[async_trait]
    impl LanguageModel for Flaky {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(AppError::Upstream {
                    status: self.status,
                    message: format!("failure {}", call),
                })
            } else {
                Ok("done".to_string())
            }
        }

        async fn stream(&self, _request: &CompletionRequest) -> Result<TokenStream> {
            unimplemented!()
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[test]
    fn test_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
        assert_eq!(policy.total_backoff(), Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_max_attempts() {
        let model = Flaky::new(u32::MAX, Some(503));
        let policy = RetryPolicy::default();
        let started = tokio::time::Instant::now();

        let err = complete_with_retry(&model, &CompletionRequest::new("m", "x"), &policy)
            .await
            .unwrap_err();

        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(14));
        match err {
            AppError::RetryExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.to_string().contains("failure 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let model = Flaky::new(1, None);
        let text = complete_with_retry(&model, &CompletionRequest::new("m", "x"), &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(text, "done");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_is_not_retried() {
        let model = Flaky::new(u32::MAX, Some(401));
        let err = complete_with_retry(&model, &CompletionRequest::new("m", "x"), &RetryPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upstream { status: Some(401), .. }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }
}
