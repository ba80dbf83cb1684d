use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tracing::warn;

use fable_core::backend::{GenerationOptions, NarrationBackend};
use fable_core::errors::BackendError;
use fable_core::prompt::PromptContext;
use fable_core::stream::StreamEvent;

/// Retry behavior for [`ReliableBackend`].
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Retries per request, on top of the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.2,
        }
    }
}

/// Wraps a NarrationBackend with bounded retries.
///
/// - Retryable errors are retried with exponential backoff + jitter
/// - Fatal errors and exhausted retries surface a single error to the caller
/// - Once any StreamEvent has been yielded, retries are NOT attempted (the
///   stream is committed)
pub struct ReliableBackend<B: NarrationBackend> {
    inner: B,
    config: RetryConfig,
    total_retries: AtomicU64,
}

impl<B: NarrationBackend> ReliableBackend<B> {
    pub fn new(inner: B, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            total_retries: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: B) -> Self {
        Self::new(inner, RetryConfig::default())
    }

    /// Delay before retry `attempt` (0-based): exponential backoff + jitter.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let exp_delay = self.config.base_delay.as_millis() as f64 * 2.0_f64.powi(attempt as i32);
        let capped = exp_delay.min(self.config.max_delay.as_millis() as f64);

        let jitter_range = capped * self.config.jitter_factor;
        let jitter = (random_u64() % (jitter_range as u64 * 2 + 1)) as f64 - jitter_range;
        let final_ms = (capped + jitter).max(100.0);

        Duration::from_millis(final_ms as u64)
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }
}

/// Simple non-cryptographic random u64 using thread-local state.
fn random_u64() -> u64 {
    use std::cell::Cell;
    use std::time::SystemTime;

    thread_local! {
        static STATE: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
        );
    }

    STATE.with(|s| {
        // xorshift64
        let mut x = s.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        s.set(x);
        x
    })
}

#[async_trait]
impl<B: NarrationBackend> NarrationBackend for ReliableBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        self.inner.list_models().await
    }

    async fn stream(
        &self,
        prompt: &PromptContext,
        options: &GenerationOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send>>, BackendError> {
        let mut last_error: Option<BackendError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.inner.stream(prompt, options).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    if e.is_fatal() || !e.is_retryable() || attempt == self.config.max_retries {
                        return Err(e);
                    }

                    let delay = self.retry_delay(attempt);
                    self.total_retries.fetch_add(1, Ordering::Relaxed);

                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after error"
                    );

                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BackendError::Network("max retries exceeded".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockResponse};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
        }
    }

    #[tokio::test]
    async fn success_on_first_try() {
        let mock = MockBackend::new(vec![MockResponse::stream_text("hello")]);
        let reliable = ReliableBackend::with_defaults(mock);

        let prompt = PromptContext::empty();
        let result = reliable.stream(&prompt, &GenerationOptions::default()).await;
        assert!(result.is_ok());
        assert_eq!(reliable.total_retries(), 0);
    }

    #[tokio::test]
    async fn retries_on_retryable_error() {
        let mock = MockBackend::new(vec![
            MockResponse::Error(BackendError::ServerError {
                status: 500,
                body: "internal".into(),
            }),
            MockResponse::Error(BackendError::Unavailable("starting up".into())),
            MockResponse::stream_text("recovered"),
        ]);
        let reliable = ReliableBackend::new(mock, fast_config(3));

        let prompt = PromptContext::empty();
        let result = reliable.stream(&prompt, &GenerationOptions::default()).await;
        assert!(result.is_ok());
        assert_eq!(reliable.total_retries(), 2);
    }

    #[tokio::test]
    async fn fatal_error_not_retried() {
        let mock = MockBackend::new(vec![
            MockResponse::Error(BackendError::ModelNotFound("ghost:7b".into())),
            MockResponse::stream_text("should not reach"),
        ]);
        let reliable = ReliableBackend::with_defaults(mock);

        let prompt = PromptContext::empty();
        let result = reliable.stream(&prompt, &GenerationOptions::default()).await;
        assert!(matches!(result, Err(BackendError::ModelNotFound(_))));
        assert_eq!(reliable.total_retries(), 0);
    }

    #[tokio::test]
    async fn bound_exhausted_surfaces_single_error() {
        let timeout = BackendError::Timeout(Duration::from_secs(1));
        let mock = MockBackend::new(vec![
            MockResponse::Error(timeout.clone()),
            MockResponse::Error(timeout.clone()),
            MockResponse::Error(timeout.clone()),
        ]);
        let reliable = ReliableBackend::new(mock, fast_config(2));

        let prompt = PromptContext::empty();
        let result = reliable.stream(&prompt, &GenerationOptions::default()).await;
        assert!(matches!(result, Err(BackendError::Timeout(_))));
        // Initial attempt plus two retries, all three scripted errors consumed.
        assert_eq!(reliable.inner.call_count(), 3);
        assert_eq!(reliable.total_retries(), 2);
    }

    #[test]
    fn retry_delay_exponential_backoff() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
        };
        let reliable = ReliableBackend::new(MockBackend::new(vec![]), config);

        assert_eq!(reliable.retry_delay(0).as_millis(), 100);
        assert_eq!(reliable.retry_delay(1).as_millis(), 200);
        assert_eq!(reliable.retry_delay(2).as_millis(), 400);
    }

    #[test]
    fn retry_delay_capped_at_max() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter_factor: 0.0,
        };
        let reliable = ReliableBackend::new(MockBackend::new(vec![]), config);

        assert_eq!(reliable.retry_delay(10).as_millis(), 5000);
    }

    #[test]
    fn config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
    }
}
