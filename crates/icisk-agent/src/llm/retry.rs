use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;
use crate::llm::types::{CompletionRequest, CompletionResponse};
use crate::llm::LlmProvider;

/// Retry configuration for [`RetryingProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// Wraps a provider with retry on transient failures.
///
/// Retries rate-limit and server errors with exponential backoff;
/// everything else (auth failures, malformed requests) fails fast.
pub struct RetryingProvider<P> {
    inner: P,
    config: RetryConfig,
}

impl<P> RetryingProvider<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 529),
        Error::Http(e) => e.is_timeout() || e.is_connect(),
        _ => false,
    }
}

fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config.base_delay_ms.saturating_mul(1 << attempt.min(16));
    let capped = exp.min(config.max_delay_ms);
    // Deterministic half-jitter keeps the test clock predictable.
    Duration::from_millis(capped / 2 + capped / 2 * (attempt as u64 % 2))
}

impl<P: LlmProvider> LlmProvider for RetryingProvider<P> {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(error) if is_retryable(&error) && attempt < self.config.max_retries => {
                    let delay = backoff_delay(&self.config, attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{StopReason, TokenUsage};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProvider {
        calls: AtomicU32,
        fail_first: u32,
        fail_status: u16,
    }

    impl CountingProvider {
        fn new(fail_first: u32, fail_status: u16) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                fail_status,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LlmProvider for CountingProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, Error> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(Error::Api {
                    status: self.fail_status,
                    message: "server overloaded".into(),
                })
            } else {
                Ok(CompletionResponse {
                    content: vec![],
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::default(),
                })
            }
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: String::new(),
            messages: vec![],
            tools: vec![],
            tool_choice: None,
            max_tokens: 16,
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
        }
    }

    #[tokio::test]
    async fn retries_rate_limit_errors_until_success() {
        let inner = CountingProvider::new(2, 429);
        let provider = RetryingProvider::new(inner, fast_config());
        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(provider.inner.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let inner = CountingProvider::new(u32::MAX, 503);
        let provider = RetryingProvider::new(inner, fast_config());
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 503, .. }));
        // initial attempt + 3 retries
        assert_eq!(provider.inner.calls(), 4);
    }

    #[tokio::test]
    async fn does_not_retry_auth_failures() {
        let inner = CountingProvider::new(u32::MAX, 401);
        let provider = RetryingProvider::new(inner, fast_config());
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 401, .. }));
        assert_eq!(provider.inner.calls(), 1);
    }

    #[test]
    fn backoff_delay_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay_ms: 500,
            max_delay_ms: 2_000,
        };
        assert!(backoff_delay(&config, 9) <= Duration::from_millis(2_000));
    }
}
