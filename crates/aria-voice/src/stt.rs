use crate::config::{credential, ProviderConfig};
use crate::error::VoiceError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

/// Maximum audio input size for transcription (10 MiB).
pub const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

const GROQ_BASE_URL: &str = "https://api.groq.com";
const WHISPER_MODEL: &str = "whisper-large-v3";

/// Converts one complete utterance to text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Returns the transcript, or an empty string when no speech was found.
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError>;
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Groq-hosted Whisper transcription over the OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct GroqWhisper {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GroqWhisper {
    pub fn new(http: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            http,
            api_key: credential(&config.groq_api_key),
            base_url: GROQ_BASE_URL.to_string(),
        }
    }

    /// Points the client at a different host, e.g. a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SpeechToText for GroqWhisper {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(VoiceError::ProviderUnconfigured("groq"))?;

        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::TranscriptionFailed(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let file = Part::bytes(audio.to_vec())
            .file_name("audio.webm")
            .mime_str("audio/webm")
            .map_err(|e| VoiceError::TranscriptionFailed(format!("invalid MIME type: {e}")))?;
        let form = Form::new()
            .part("file", file)
            .text("model", WHISPER_MODEL)
            .text("response_format", "json")
            .text("language", "en");

        let response = self
            .http
            .post(format!("{}/openai/v1/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::TranscriptionFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::TranscriptionFailed(format!(
                "Groq API error ({status}): {body}"
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::TranscriptionFailed(format!("invalid response: {e}")))?;
        tracing::debug!(chars = parsed.text.len(), "transcription complete");
        Ok(parsed.text.trim().to_string())
    }
}
