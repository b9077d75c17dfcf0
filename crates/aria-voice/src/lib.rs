//! Speech and language provider adapters for the voice gateway.
//!
//! Each pipeline stage sits behind a small async trait so sessions can be
//! driven by real hosted services in production and scripted fakes in tests:
//!
//! - [`SpeechToText`]: Groq-hosted Whisper ([`GroqWhisper`]).
//! - [`LanguageModel`]: Anthropic, Gemini and OpenAI chat APIs, selected by
//!   name through [`LanguageModels`].
//! - [`TextToSpeech`]: Azure neural voices via SSML ([`AzureSpeech`]).
//!
//! All adapters share one `reqwest::Client` built from [`ProviderConfig`].

pub mod config;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod stt;
pub mod tts;

pub use config::ProviderConfig;
pub use error::VoiceError;
pub use llm::{
    ClaudeModel, GeminiModel, LanguageModel, LanguageModels, LlmProvider, OpenAiModel,
    FALLBACK_REPLY,
};
pub use prompt::{conversation, system_prompt, ChatMessage};
pub use stt::{GroqWhisper, SpeechToText, MAX_STT_INPUT_BYTES};
pub use tts::{build_ssml, AzureSpeech, Prosody, TextToSpeech, MAX_TTS_INPUT_BYTES, OUTPUT_FORMAT};
