//! Narration backends: Ollama and LM Studio clients, model routing, retry
//! wrapper, and a mock backend for tests.

pub mod mock;
pub mod models;
pub mod ollama;
pub mod openai;
pub mod reliable;
pub mod router;
mod wire;

pub use mock::{MockBackend, MockResponse};
pub use models::{detect_kind, BackendKind, DEFAULT_MODEL};
pub use ollama::OllamaBackend;
pub use openai::LmStudioBackend;
pub use reliable::{ReliableBackend, RetryConfig};
pub use router::RoutedBackend;
