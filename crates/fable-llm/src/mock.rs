use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use futures::Stream;
use parking_lot::Mutex;

use fable_core::backend::{GenerationOptions, NarrationBackend};
use fable_core::errors::BackendError;
use fable_core::prompt::PromptContext;
use fable_core::stream::StreamEvent;

/// Pre-programmed responses for deterministic testing without a running
/// server.
#[derive(Clone)]
pub enum MockResponse {
    /// Yield a sequence of StreamEvents.
    Stream(Vec<StreamEvent>),
    /// Return an error from the stream() call itself.
    Error(BackendError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// Convenience: a well-formed text response.
    pub fn stream_text(text: &str) -> Self {
        let text = text.to_string();
        Self::Stream(vec![
            StreamEvent::Start,
            StreamEvent::Delta { text: text.clone() },
            StreamEvent::Done { text },
        ])
    }

    /// Convenience: a stream that starts and then fails mid-flight.
    pub fn stream_error(error: BackendError) -> Self {
        Self::Stream(vec![StreamEvent::Start, StreamEvent::Error { error }])
    }

    /// Convenience: wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock backend that returns pre-programmed responses in sequence.
pub struct MockBackend {
    responses: Mutex<Vec<MockResponse>>,
    call_count: AtomicUsize,
    models: Result<Vec<String>, BackendError>,
}

impl MockBackend {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: AtomicUsize::new(0),
            models: Ok(vec!["mock-model".to_string()]),
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = Ok(models);
        self
    }

    pub fn with_models_error(mut self, error: BackendError) -> Self {
        self.models = Err(error);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NarrationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        self.models.clone()
    }

    async fn stream(
        &self,
        _prompt: &PromptContext,
        _options: &GenerationOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send>>, BackendError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);

        let response = {
            let responses = self.responses.lock();
            match responses.get(idx) {
                Some(response) => response.clone(),
                None => {
                    return Err(BackendError::InvalidRequest(format!(
                        "no mock response configured for call {idx}"
                    )))
                }
            }
        };

        resolve_response(response).await
    }
}

/// Resolve a MockResponse, handling Delay by sleeping first. Unrolls nested
/// delays iteratively to avoid recursive async.
async fn resolve_response(
    response: MockResponse,
) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send>>, BackendError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Stream(events) => return Ok(Box::pin(stream::iter(events))),
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
        }
    }
}
