use std::path::PathBuf;
use std::time::Duration;

use fable_llm::RetryConfig;

/// Tunables for one session. Defaults mirror a comfortable local setup: a
/// generous character budget and a long request timeout for slow local
/// models.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Context Store budget in characters.
    pub budget_chars: usize,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    /// Target for `/save` without an argument.
    pub default_save_path: PathBuf,
    /// Best-effort autosave target on fatal termination.
    pub autosave_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            budget_chars: 10_000,
            temperature: 0.7,
            max_tokens: 2048,
            request_timeout: Duration::from_secs(180),
            retry: RetryConfig::default(),
            default_save_path: PathBuf::from("saves/adventure.txt"),
            autosave_path: PathBuf::from("saves/autosave.txt"),
        }
    }
}
