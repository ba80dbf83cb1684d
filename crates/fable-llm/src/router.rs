use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tracing::warn;

use fable_core::backend::{GenerationOptions, NarrationBackend};
use fable_core::errors::BackendError;
use fable_core::prompt::PromptContext;
use fable_core::stream::StreamEvent;

use crate::models::{detect_kind, BackendKind};

/// Dispatches each request to the backend that serves the requested model,
/// decided per call from the model identifier. Switching models mid-session
/// can silently switch backends.
pub struct RoutedBackend {
    ollama: Arc<dyn NarrationBackend>,
    lm_studio: Arc<dyn NarrationBackend>,
}

impl RoutedBackend {
    pub fn new(ollama: Arc<dyn NarrationBackend>, lm_studio: Arc<dyn NarrationBackend>) -> Self {
        Self { ollama, lm_studio }
    }

    fn backend_for(&self, model: &str) -> &Arc<dyn NarrationBackend> {
        match detect_kind(model) {
            BackendKind::Ollama => &self.ollama,
            BackendKind::LmStudio => &self.lm_studio,
        }
    }
}

#[async_trait]
impl NarrationBackend for RoutedBackend {
    fn name(&self) -> &str {
        "routed"
    }

    /// Union of both servers' models. A single unreachable server degrades to
    /// the other's list; only both failing is an error.
    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let mut models = Vec::new();
        let mut first_error = None;

        for backend in [&self.ollama, &self.lm_studio] {
            match backend.list_models().await {
                Ok(mut found) => models.append(&mut found),
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "model listing failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match (models.is_empty(), first_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(models),
        }
    }

    async fn stream(
        &self,
        prompt: &PromptContext,
        options: &GenerationOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send>>, BackendError> {
        self.backend_for(&options.model).stream(prompt, options).await
    }
}
