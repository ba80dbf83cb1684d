use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

const TTS_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_VOICE: &str = "FemaleBritishAccent_WhyLucyWhy_Voice_2.wav";

/// Fire-and-forget narration audio via a local AllTalk server. Speaking never
/// blocks the session loop and failures are logged, not surfaced.
#[derive(Clone)]
pub struct TtsClient {
    client: Client,
    api_url: Arc<String>,
    voice: Arc<String>,
}

impl TtsClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: Arc::new(api_url.into()),
            voice: Arc::new(DEFAULT_VOICE.to_string()),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Arc::new(voice.into());
        self
    }

    /// Queue narration audio for the given text. Empty text is skipped.
    pub fn speak(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        let client = self.client.clone();
        let url = self.api_url.clone();
        let voice = self.voice.clone();
        let form: Vec<(&'static str, String)> = vec![
            ("text_input", text.to_string()),
            ("character_voice_gen", voice.to_string()),
            ("narrator_enabled", "true".into()),
            ("narrator_voice_gen", "narrator.wav".into()),
            ("text_filtering", "none".into()),
            ("output_file_name", "output".into()),
            ("autoplay", "true".into()),
            ("autoplay_volume", "0.8".into()),
        ];

        tokio::spawn(async move {
            let result = client
                .post(url.as_str())
                .form(&form)
                .timeout(TTS_TIMEOUT)
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {
                    debug!("narration audio queued");
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "tts server rejected request");
                }
                Err(e) => {
                    warn!(error = %e, "tts request failed");
                }
            }
        });
    }
}
