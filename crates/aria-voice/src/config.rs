use crate::error::VoiceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

fn default_llm() -> String {
    "claude".to_string()
}

fn default_stage_timeout_seconds() -> u64 {
    60
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_azure_speech_region() -> String {
    "eastus".to_string()
}

/// Credentials and tunables for the external speech and language providers.
///
/// A missing key is not an error here; calls to that provider fail with
/// `VoiceError::ProviderUnconfigured` instead.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Language model used when a session does not name one.
    #[serde(default = "default_llm")]
    pub default_llm: String,

    /// Upper bound on each turn stage, in seconds.
    #[serde(default = "default_stage_timeout_seconds")]
    pub stage_timeout_seconds: u64,

    /// Per-request timeout applied by the HTTP client, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    #[serde(default, skip_serializing)]
    pub groq_api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub claude_api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub gemini_api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub azure_speech_key: Option<String>,

    #[serde(default = "default_azure_speech_region")]
    pub azure_speech_region: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_llm: default_llm(),
            stage_timeout_seconds: default_stage_timeout_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
            groq_api_key: None,
            claude_api_key: None,
            gemini_api_key: None,
            openai_api_key: None,
            azure_speech_key: None,
            azure_speech_region: default_azure_speech_region(),
        }
    }
}

fn redact(key: &Option<String>) -> &'static str {
    match key {
        Some(_) => "[REDACTED]",
        None => "<unset>",
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("default_llm", &self.default_llm)
            .field("stage_timeout_seconds", &self.stage_timeout_seconds)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("groq_api_key", &redact(&self.groq_api_key))
            .field("claude_api_key", &redact(&self.claude_api_key))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("azure_speech_key", &redact(&self.azure_speech_key))
            .field("azure_speech_region", &self.azure_speech_region)
            .finish()
    }
}

impl ProviderConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_seconds)
    }

    /// Builds the HTTP client shared by every provider adapter.
    pub fn http_client(&self) -> Result<reqwest::Client, VoiceError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("aria-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {e}")))
    }
}

/// Treats blank strings as absent, so `KEY=` in the environment disables a
/// provider instead of sending an empty credential.
pub(crate) fn credential(key: &Option<String>) -> Option<String> {
    key.as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}
