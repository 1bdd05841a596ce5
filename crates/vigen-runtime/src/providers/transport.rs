//! Timeout and transient-error retry around a single provider call.
//!
//! These retries resend the identical request. They are separate from the
//! pipeline's regeneration loop, which never sees a transient error that a
//! resend fixed.

use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;

use super::{GenerationConfig, ProviderError, VisionProvider, VisionRequest, VisionResponse};

/// How often and how quickly to resend after a transient failure.
#[derive(Debug, Clone, Copy)]
pub struct TransportPolicy {
    /// Resends after the first attempt
    pub retries: usize,
    /// First backoff delay; doubles on each resend
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl TransportPolicy {
    pub fn with_retries(retries: usize) -> Self {
        Self {
            retries,
            ..Default::default()
        }
    }
}

/// Send `request`, enforcing `config.timeout` per attempt and retrying
/// transient errors.
pub async fn send_with_retry(
    provider: &dyn VisionProvider,
    request: &VisionRequest,
    config: &GenerationConfig,
    policy: TransportPolicy,
) -> Result<VisionResponse, ProviderError> {
    let attempt = || async move {
        match tokio::time::timeout(config.timeout, provider.generate(request, config)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(config.timeout)),
        }
    };

    attempt
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(policy.min_delay)
                .with_max_delay(policy.max_delay)
                .with_max_times(policy.retries),
        )
        .when(ProviderError::is_transient)
        .notify(|err: &ProviderError, delay: Duration| {
            tracing::warn!(
                provider = provider.name(),
                model = %config.model,
                error = %err,
                delay = ?delay,
                "Transient provider error, resending"
            );
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ResponsePart;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct Flaky {
        results: Mutex<VecDeque<Result<VisionResponse, ProviderError>>>,
        calls: Mutex<usize>,
    }

    impl Flaky {
        fn new(results: Vec<Result<VisionResponse, ProviderError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl VisionProvider for Flaky {
        async fn generate(
            &self,
            _request: &VisionRequest,
            _config: &GenerationConfig,
        ) -> Result<VisionResponse, ProviderError> {
            *self.calls.lock() += 1;
            self.results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::HttpError("exhausted".into())))
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    struct Stalled;

    #[async_trait]
    impl VisionProvider for Stalled {
        async fn generate(
            &self,
            _request: &VisionRequest,
            _config: &GenerationConfig,
        ) -> Result<VisionResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(VisionResponse::default())
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    fn ok(text: &str) -> Result<VisionResponse, ProviderError> {
        Ok(VisionResponse {
            parts: vec![ResponsePart::Text(text.into())],
            ..Default::default()
        })
    }

    fn fast(retries: usize) -> TransportPolicy {
        TransportPolicy {
            retries,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_transient_error_is_resent() {
        let provider = Flaky::new(vec![
            Err(ProviderError::RateLimited { retry_after: None }),
            Err(ProviderError::ApiError {
                status: 503,
                message: "busy".into(),
            }),
            ok("done"),
        ]);
        let response = send_with_retry(&provider, &VisionRequest::text("q"), &GenerationConfig::default(), fast(2))
            .await
            .unwrap();
        assert_eq!(response.text(), "done");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_resent() {
        let provider = Flaky::new(vec![Err(ProviderError::AuthError), ok("never")]);
        let result =
            send_with_retry(&provider, &VisionRequest::text("q"), &GenerationConfig::default(), fast(3)).await;
        assert!(matches!(result, Err(ProviderError::AuthError)));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let provider = Flaky::new(vec![]);
        let result =
            send_with_retry(&provider, &VisionRequest::text("q"), &GenerationConfig::default(), fast(2)).await;
        assert!(matches!(result, Err(ProviderError::HttpError(_))));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let config = GenerationConfig {
            timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let result = send_with_retry(&Stalled, &VisionRequest::text("q"), &config, fast(0)).await;
        assert!(matches!(result, Err(ProviderError::Timeout(d)) if d == Duration::from_secs(5)));
    }
}
