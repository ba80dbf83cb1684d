use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::BackendError;
use crate::prompt::PromptContext;
use crate::stream::StreamEvent;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Options controlling a single generation request. The model identifier is
/// read fresh from the session's mode state on every call — backends must not
/// cache it.
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.7,
            max_tokens: 2048,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl GenerationOptions {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Trait implemented by each narration backend (Ollama, LM Studio, mock).
/// Purely a request/response boundary — implementations never touch session
/// state.
#[async_trait]
pub trait NarrationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Capability query: models currently served by this backend.
    async fn list_models(&self) -> Result<Vec<String>, BackendError>;

    /// Start a generation. The returned stream is lazy, finite, and
    /// non-restartable.
    async fn stream(
        &self,
        prompt: &PromptContext,
        options: &GenerationOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send>>, BackendError>;
}
