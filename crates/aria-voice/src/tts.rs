use crate::config::{credential, ProviderConfig};
use crate::error::VoiceError;
use aria_types::VoicePreferences;
use async_trait::async_trait;

/// Maximum text input size for synthesis (64 KiB).
pub const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Container format of every synthesized clip.
pub const OUTPUT_FORMAT: &str = "mp3";

const AZURE_OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Renders text to encoded audio.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoicePreferences)
        -> Result<Vec<u8>, VoiceError>;
}

/// Voice adjustments in the provider's native units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prosody {
    /// Signed Hz offset, e.g. `+25Hz`.
    pub pitch: String,
    /// Signed percentage, e.g. `-50%`.
    pub rate: String,
    /// Signed percentage, e.g. `+0%`.
    pub volume: String,
}

fn offset(multiplier: f32, scale: f32) -> i32 {
    if !multiplier.is_finite() {
        return 0;
    }
    ((multiplier - 1.0) * scale).trunc() as i32
}

impl Prosody {
    /// Maps the linear 0.5–2.0 scale onto SSML prosody offsets, truncating
    /// toward zero.
    pub fn from_preferences(voice: &VoicePreferences) -> Self {
        Self {
            pitch: format!("{:+}Hz", offset(voice.pitch, 50.0)),
            rate: format!("{:+}%", offset(voice.rate, 100.0)),
            volume: format!("{:+}%", offset(voice.volume, 100.0)),
        }
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Wraps `text` in an SSML document for the given voice.
pub fn build_ssml(text: &str, voice: &VoicePreferences) -> String {
    let prosody = Prosody::from_preferences(voice);
    format!(
        "<speak version=\"1.0\" xmlns=\"http://www.w3.org/2001/10/synthesis\" xml:lang=\"en-US\">\
         <voice name=\"{}\"><prosody pitch=\"{}\" rate=\"{}\" volume=\"{}\">{}</prosody></voice></speak>",
        escape_xml(&voice.name),
        prosody.pitch,
        prosody.rate,
        prosody.volume,
        escape_xml(text)
    )
}

/// Azure Cognitive Services neural voices.
#[derive(Debug, Clone)]
pub struct AzureSpeech {
    http: reqwest::Client,
    subscription_key: Option<String>,
    endpoint: String,
}

impl AzureSpeech {
    pub fn new(http: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            http,
            subscription_key: credential(&config.azure_speech_key),
            endpoint: format!(
                "https://{}.tts.speech.microsoft.com",
                config.azure_speech_region
            ),
        }
    }

    /// Points the client at a different host, e.g. a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint = base_url.into();
        self
    }
}

#[async_trait]
impl TextToSpeech for AzureSpeech {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoicePreferences,
    ) -> Result<Vec<u8>, VoiceError> {
        let key = self
            .subscription_key
            .as_deref()
            .ok_or(VoiceError::ProviderUnconfigured("azure"))?;

        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::SynthesisFailed(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let response = self
            .http
            .post(format!("{}/cognitiveservices/v1", self.endpoint))
            .header("Ocp-Apim-Subscription-Key", key)
            .header(reqwest::header::CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", AZURE_OUTPUT_FORMAT)
            .body(build_ssml(text, voice))
            .send()
            .await
            .map_err(|e| VoiceError::SynthesisFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::SynthesisFailed(format!(
                "Azure speech error ({status}): {body}"
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| VoiceError::SynthesisFailed(format!("failed to read audio: {e}")))?;
        tracing::debug!(bytes = audio.len(), voice = %voice.name, "synthesis complete");
        Ok(audio.to_vec())
    }
}
