//! Language-model adapters and the provider registry.

use crate::config::{credential, ProviderConfig};
use crate::error::VoiceError;
use crate::prompt::{conversation, ChatMessage};
use aria_types::{HistoryEntry, Role};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Reply spoken when a configured provider fails mid-request.
pub const FALLBACK_REPLY: &str = "I'm sorry, I encountered an error processing your request.";

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const CLAUDE_MODEL: &str = "claude-3-5-sonnet-20241022";
const MAX_TOKENS: u32 = 1024;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const GEMINI_MODEL: &str = "gemini-1.5-flash";

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENAI_MODEL: &str = "gpt-4o-mini";

/// Names accepted in a session's `llmProvider` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    Claude,
    Gemini,
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = VoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(Self::Claude),
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(VoiceError::UnknownProvider(other.to_string())),
        }
    }
}

/// A single chat-completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produces a reply to `prompt` given the persona and prior turns.
    ///
    /// Adapters report every failure as an error; substituting the fallback
    /// reply is the registry's job.
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<String, VoiceError>;
}

fn completion_failed(provider: LlmProvider, reason: impl Into<String>) -> VoiceError {
    VoiceError::CompletionFailed {
        provider: provider.as_str(),
        reason: reason.into(),
    }
}

async fn send_json(
    provider: LlmProvider,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value, VoiceError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| completion_failed(provider, format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(completion_failed(provider, format!("HTTP {status}: {text}")));
    }

    response
        .json()
        .await
        .map_err(|e| completion_failed(provider, format!("invalid response body: {e}")))
}

fn extract_text(provider: LlmProvider, text: Option<&str>) -> Result<String, VoiceError> {
    text.map(str::to_string)
        .ok_or_else(|| completion_failed(provider, "response contained no text"))
}

/// Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct ClaudeModel {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl ClaudeModel {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: ANTHROPIC_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(system_prompt: &str, messages: &[ChatMessage]) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        json!({
            "model": CLAUDE_MODEL,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt,
            "messages": messages,
        })
    }
}

#[async_trait]
impl LanguageModel for ClaudeModel {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<String, VoiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(VoiceError::ProviderUnconfigured("claude"))?;

        let body = Self::request_body(system_prompt, &conversation(history, prompt));
        let request = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);

        let reply = send_json(LlmProvider::Claude, request, &body).await?;
        let text = reply["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b["type"] == "text")
                    .and_then(|b| b["text"].as_str())
            });
        extract_text(LlmProvider::Claude, text)
    }
}

/// Google Gemini `generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiModel {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(system_prompt: &str, messages: &[ChatMessage]) -> Value {
        let contents: Vec<Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();
        json!({
            "systemInstruction": { "parts": [{ "text": system_prompt }] },
            "contents": contents,
            "generationConfig": { "maxOutputTokens": MAX_TOKENS },
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<String, VoiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(VoiceError::ProviderUnconfigured("gemini"))?;

        let body = Self::request_body(system_prompt, &conversation(history, prompt));
        let request = self
            .http
            .post(format!(
                "{}/v1beta/models/{GEMINI_MODEL}:generateContent",
                self.base_url
            ))
            .header("x-goog-api-key", api_key);

        let reply = send_json(LlmProvider::Gemini, request, &body).await?;
        extract_text(
            LlmProvider::Gemini,
            reply["candidates"][0]["content"]["parts"][0]["text"].as_str(),
        )
    }
}

/// OpenAI Chat Completions.
#[derive(Debug, Clone)]
pub struct OpenAiModel {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiModel {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(system_prompt: &str, messages: &[ChatMessage]) -> Value {
        let mut all = vec![json!({ "role": "system", "content": system_prompt })];
        all.extend(
            messages
                .iter()
                .map(|m| json!({ "role": m.role.as_str(), "content": m.content })),
        );
        json!({
            "model": OPENAI_MODEL,
            "max_tokens": MAX_TOKENS,
            "messages": all,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<String, VoiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(VoiceError::ProviderUnconfigured("openai"))?;

        let body = Self::request_body(system_prompt, &conversation(history, prompt));
        let request = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key);

        let reply = send_json(LlmProvider::OpenAi, request, &body).await?;
        extract_text(
            LlmProvider::OpenAi,
            reply["choices"][0]["message"]["content"].as_str(),
        )
    }
}

/// Name-to-adapter lookup used by sessions.
#[derive(Clone, Default)]
pub struct LanguageModels {
    models: HashMap<LlmProvider, Arc<dyn LanguageModel>>,
}

impl LanguageModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the three hosted providers with the configured credentials.
    pub fn from_config(http: &reqwest::Client, config: &ProviderConfig) -> Self {
        Self::new()
            .with(
                LlmProvider::Claude,
                Arc::new(ClaudeModel::new(http.clone(), credential(&config.claude_api_key))),
            )
            .with(
                LlmProvider::Gemini,
                Arc::new(GeminiModel::new(http.clone(), credential(&config.gemini_api_key))),
            )
            .with(
                LlmProvider::OpenAi,
                Arc::new(OpenAiModel::new(http.clone(), credential(&config.openai_api_key))),
            )
    }

    pub fn with(mut self, provider: LlmProvider, model: Arc<dyn LanguageModel>) -> Self {
        self.models.insert(provider, model);
        self
    }

    /// Resolves a provider name to its adapter.
    pub fn select(&self, provider_name: &str) -> Result<&Arc<dyn LanguageModel>, VoiceError> {
        let provider: LlmProvider = provider_name.parse()?;
        self.models
            .get(&provider)
            .ok_or_else(|| VoiceError::UnknownProvider(provider_name.to_string()))
    }

    /// Runs a completion on the named provider.
    ///
    /// # Errors
    ///
    /// Only `UnknownProvider` and `ProviderUnconfigured` are returned; any
    /// other provider failure is logged and replaced by [`FALLBACK_REPLY`].
    pub async fn complete(
        &self,
        provider_name: &str,
        prompt: &str,
        system_prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<String, VoiceError> {
        let model = self.select(provider_name)?;
        match model.complete(prompt, system_prompt, history).await {
            Ok(text) => Ok(text),
            Err(e @ VoiceError::ProviderUnconfigured(_)) => Err(e),
            Err(e) => {
                tracing::warn!(provider = provider_name, error = %e, "completion failed, using fallback reply");
                Ok(FALLBACK_REPLY.to_string())
            }
        }
    }
}
