use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use fable_core::backend::{GenerationOptions, NarrationBackend};
use fable_core::errors::BackendError;
use fable_core::prompt::PromptContext;
use fable_core::stream::StreamEvent;

use crate::wire::{LineParser, LineStream};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a local LM Studio server, which speaks the OpenAI-compatible
/// chat API. Responses stream as SSE `data:` lines ending with a `[DONE]`
/// sentinel.
pub struct LmStudioBackend {
    client: Client,
    base_url: String,
}

impl LmStudioBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(timeout)
    } else if e.is_connect() {
        BackendError::Unavailable(e.to_string())
    } else {
        BackendError::Network(e.to_string())
    }
}

#[async_trait]
impl NarrationBackend for LmStudioBackend {
    fn name(&self) -> &str {
        "lm-studio"
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/v1/models", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, CONNECT_TIMEOUT))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, body));
        }

        let listing: ModelsResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(listing.data.into_iter().map(|m| m.id).collect())
    }

    #[instrument(skip(self, prompt, options), fields(model = %options.model))]
    async fn stream(
        &self,
        prompt: &PromptContext,
        options: &GenerationOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send>>, BackendError> {
        let messages: Vec<_> = prompt
            .chat_messages()
            .into_iter()
            .map(|(role, content)| json!({ "role": role, "content": content }))
            .collect();

        let body = json!({
            "model": options.model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": true,
        });

        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(url = %url, "starting chat completion request");

        let timeout = options.request_timeout;
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, body));
        }

        let byte_stream = resp
            .bytes_stream()
            .map_err(move |e| map_reqwest_error(e, timeout));
        Ok(Box::pin(LineStream::new(
            byte_stream,
            SseChatParser::new(),
            timeout,
        )))
    }
}

/// Decoder for OpenAI-style chat completion SSE: `data: {json}` lines with a
/// final `data: [DONE]` sentinel. Non-data lines (comments, event names) are
/// ignored.
pub(crate) struct SseChatParser {
    text: String,
    finished: bool,
}

impl SseChatParser {
    pub(crate) fn new() -> Self {
        Self {
            text: String::new(),
            finished: false,
        }
    }
}

impl LineParser for SseChatParser {
    fn parse_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let payload = match line.strip_prefix("data:") {
            Some(payload) => payload.trim(),
            None => return Vec::new(),
        };

        if payload == "[DONE]" {
            self.finished = true;
            return vec![StreamEvent::Done {
                text: self.text.clone(),
            }];
        }

        let chunk: ChatChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(_) => {
                warn!(line = %line, "skipping malformed chunk");
                return Vec::new();
            }
        };

        let delta = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .unwrap_or_default();
        if delta.is_empty() {
            return Vec::new();
        }
        self.text.push_str(&delta);
        vec![StreamEvent::Delta { text: delta }]
    }

    fn end_of_stream(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            Vec::new()
        } else {
            vec![StreamEvent::Error {
                error: BackendError::StreamInterrupted(
                    "response ended before the [DONE] sentinel".into(),
                ),
            }]
        }
    }
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    delta: ChatDelta,
}

#[derive(Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}
