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

/// Client for a local Ollama server. Narration uses the completion-style
/// `/api/generate` endpoint, which streams NDJSON chunks.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
}

impl OllamaBackend {
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
impl NarrationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
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

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    #[instrument(skip(self, prompt, options), fields(model = %options.model))]
    async fn stream(
        &self,
        prompt: &PromptContext,
        options: &GenerationOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send>>, BackendError> {
        let body = json!({
            "model": options.model,
            "prompt": prompt.render_flat(),
            "stream": true,
            "options": {
                "temperature": options.temperature,
                "min_p": 0.05,
                "top_k": 40,
                "top_p": 0.9,
                "num_ctx": 4096,
                "repeat_penalty": 1.1,
                "num_predict": options.max_tokens,
            },
        });

        let url = format!("{}/api/generate", self.base_url);
        debug!(url = %url, "starting generation request");

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
            NdjsonParser::new(),
            timeout,
        )))
    }
}

/// Decoder for Ollama's NDJSON stream: one JSON object per line, `done: true`
/// on the final chunk.
pub(crate) struct NdjsonParser {
    text: String,
    finished: bool,
}

impl NdjsonParser {
    pub(crate) fn new() -> Self {
        Self {
            text: String::new(),
            finished: false,
        }
    }
}

impl LineParser for NdjsonParser {
    fn parse_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let chunk: GenerateChunk = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(_) => {
                warn!(line = %line, "skipping malformed chunk");
                return Vec::new();
            }
        };

        if let Some(message) = chunk.error {
            self.finished = true;
            return vec![StreamEvent::Error {
                error: BackendError::ServerError {
                    status: 500,
                    body: message,
                },
            }];
        }

        let mut events = Vec::new();
        if let Some(delta) = chunk.response {
            if !delta.is_empty() {
                self.text.push_str(&delta);
                events.push(StreamEvent::Delta { text: delta });
            }
        }
        if chunk.done.unwrap_or(false) {
            self.finished = true;
            events.push(StreamEvent::Done {
                text: self.text.clone(),
            });
        }
        events
    }

    fn end_of_stream(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            Vec::new()
        } else {
            vec![StreamEvent::Error {
                error: BackendError::StreamInterrupted(
                    "response ended before the final chunk".into(),
                ),
            }]
        }
    }
}

#[derive(Deserialize)]
struct GenerateChunk {
    response: Option<String>,
    done: Option<bool>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delta_and_done_chunks() {
        let mut parser = NdjsonParser::new();

        let events = parser.parse_line(r#"{"response":"The door ","done":false}"#);
        assert!(matches!(&events[0], StreamEvent::Delta { text } if text == "The door "));

        let events = parser.parse_line(r#"{"response":"opens.","done":true}"#);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], StreamEvent::Done { text } if text == "The door opens."));

        assert!(parser.end_of_stream().is_empty());
    }

    #[test]
    fn error_chunk_becomes_error_event() {
        let mut parser = NdjsonParser::new();
        let events = parser.parse_line(r#"{"error":"model runner has stopped"}"#);
        assert!(matches!(
            &events[0],
            StreamEvent::Error {
                error: BackendError::ServerError { .. }
            }
        ));
    }

    #[test]
    fn malformed_line_skipped() {
        let mut parser = NdjsonParser::new();
        assert!(parser.parse_line("not json").is_empty());
    }

    #[test]
    fn missing_final_chunk_reports_interruption() {
        let mut parser = NdjsonParser::new();
        parser.parse_line(r#"{"response":"partial","done":false}"#);
        let tail = parser.end_of_stream();
        assert!(matches!(
            &tail[0],
            StreamEvent::Error {
                error: BackendError::StreamInterrupted(_)
            }
        ));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let backend = OllamaBackend::new("http://localhost:11434/");
        assert_eq!(backend.base_url, "http://localhost:11434");
    }
}
