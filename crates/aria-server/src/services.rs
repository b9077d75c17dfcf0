//! Provider clients shared by every voice session.

use aria_db::{HistoryCache, DEFAULT_HISTORY_WINDOW};
use aria_voice::{
    AzureSpeech, GroqWhisper, LanguageModels, ProviderConfig, SpeechToText, TextToSpeech,
    VoiceError,
};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on each turn stage when nothing else is configured.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Immutable bundle of collaborators a session needs.
///
/// Built once at startup and handed to each session behind an `Arc`.
pub struct VoiceServices {
    pub stt: Arc<dyn SpeechToText>,
    pub models: LanguageModels,
    pub tts: Arc<dyn TextToSpeech>,
    pub history: Arc<dyn HistoryCache>,
    /// Provider used when a session does not name one.
    pub default_llm: String,
    /// Upper bound on each turn stage.
    pub stage_timeout: Duration,
    /// Entries loaded when a session's context is set.
    pub history_window: usize,
}

impl VoiceServices {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        models: LanguageModels,
        tts: Arc<dyn TextToSpeech>,
        history: Arc<dyn HistoryCache>,
    ) -> Self {
        Self {
            stt,
            models,
            tts,
            history,
            default_llm: "claude".to_string(),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Wires the hosted providers from configuration.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError::Config` if the HTTP client cannot be built.
    /// Missing credentials are not an error at this point.
    pub fn from_config(
        providers: &ProviderConfig,
        history: Arc<dyn HistoryCache>,
        history_window: usize,
    ) -> Result<Self, VoiceError> {
        let http = providers.http_client()?;
        let stt = Arc::new(GroqWhisper::new(http.clone(), providers));
        let tts = Arc::new(AzureSpeech::new(http.clone(), providers));
        let models = LanguageModels::from_config(&http, providers);

        Ok(Self::new(stt, models, tts, history)
            .with_default_llm(providers.default_llm.clone())
            .with_stage_timeout(providers.stage_timeout())
            .with_history_window(history_window))
    }

    pub fn with_default_llm(mut self, name: impl Into<String>) -> Self {
        self.default_llm = name.into();
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }
}
