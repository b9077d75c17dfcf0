//! Per-connection voice session.
//!
//! A [`VoiceSession`] owns everything one connection knows about its user
//! and turns each inbound envelope into outbound envelopes. It is driven by
//! exactly one task, so turns on a connection are strictly sequential.
//!
//! Every `audio` event is framed by `processing{start}` and
//! `processing{end}`, with at most one `error` in between. A failing stage
//! skips the rest of its turn but never ends the session; only a closed
//! transport does.

use crate::services::VoiceServices;
use aria_types::{
    decode, decode_audio, encode, encode_audio, ContextData, EnvelopeError, HistoryEntry,
    InboundEnvelope, OutboundEnvelope, ProcessingStatus, Role, VoicePreferences, READY_MESSAGE,
};
use aria_voice::{system_prompt, VoiceError, FALLBACK_REPLY, MAX_STT_INPUT_BYTES};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Reply used when the transcript is empty; the language model is skipped.
pub const REPROMPT_REPLY: &str = "Sorry, I didn't catch that. Could you say that again?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Open, no context received yet.
    Connected,
    /// Context set, waiting for audio.
    Ready,
    /// A turn is running.
    Processing,
    Closed,
}

/// Ends the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport closed")]
    TransportClosed,
}

/// Aborts the current turn and is reported to the client as one `error`.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("audio payload too large: {0} bytes (limit: {max} bytes)", max = MAX_STT_INPUT_BYTES)]
    AudioTooLarge(usize),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: &'static str, seconds: u64 },

    #[error("transport closed")]
    TransportClosed,
}

impl From<SessionError> for TurnError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::TransportClosed => Self::TransportClosed,
        }
    }
}

/// What the client told us about itself, with defaults filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub user_id: Option<String>,
    pub household_id: Option<String>,
    pub user_name: Option<String>,
    pub llm_provider: String,
    pub voice: VoicePreferences,
}

impl SessionContext {
    fn defaults(services: &VoiceServices) -> Self {
        Self {
            user_id: None,
            household_id: None,
            user_name: None,
            llm_provider: services.default_llm.clone(),
            voice: VoicePreferences::default(),
        }
    }

    fn from_data(data: ContextData, services: &VoiceServices) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            user_id: non_empty(data.user_id),
            household_id: non_empty(data.household_id),
            user_name: non_empty(data.user_name),
            llm_provider: non_empty(data.llm_provider)
                .unwrap_or_else(|| services.default_llm.clone()),
            voice: data.voice_preferences.unwrap_or_default(),
        }
    }
}

pub struct VoiceSession {
    connection_id: Uuid,
    services: Arc<VoiceServices>,
    outbound: mpsc::Sender<String>,
    state: SessionState,
    context: SessionContext,
    history: Vec<HistoryEntry>,
}

impl VoiceSession {
    pub fn new(
        connection_id: Uuid,
        services: Arc<VoiceServices>,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        let context = SessionContext::defaults(&services);
        Self {
            connection_id,
            services,
            outbound,
            state: SessionState::Connected,
            context,
            history: Vec::new(),
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// History window loaded at the last `context` event.
    pub fn history_window(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Handles one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::TransportClosed` once the outbound queue is
    /// gone; the caller should stop feeding frames.
    pub async fn handle_frame(&mut self, raw: &str) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::TransportClosed);
        }

        match decode(raw) {
            Ok(InboundEnvelope::Context { data }) => {
                self.handle_context(data.unwrap_or_default()).await
            }
            Ok(InboundEnvelope::Audio { data }) => self.handle_audio(data).await,
            Ok(InboundEnvelope::Unknown) => {
                tracing::debug!(connection_id = %self.connection_id, "ignoring unknown envelope type");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(connection_id = %self.connection_id, error = %e, "rejecting inbound frame");
                self.send(OutboundEnvelope::error(e.to_string())).await
            }
        }
    }

    async fn handle_context(&mut self, data: ContextData) -> Result<(), SessionError> {
        self.context = SessionContext::from_data(data, &self.services);
        self.history = match self.context.user_id.clone() {
            Some(user_id) => self.load_history(&user_id).await,
            None => Vec::new(),
        };

        tracing::info!(
            connection_id = %self.connection_id,
            user_id = self.context.user_id.as_deref().unwrap_or("<anonymous>"),
            provider = %self.context.llm_provider,
            history = self.history.len(),
            "session context set"
        );

        self.state = SessionState::Ready;
        self.send(OutboundEnvelope::Ready {
            message: READY_MESSAGE.to_string(),
        })
        .await
    }

    async fn handle_audio(&mut self, data: Option<String>) -> Result<(), SessionError> {
        let resume = match self.state {
            SessionState::Ready => SessionState::Ready,
            _ => SessionState::Connected,
        };
        self.state = SessionState::Processing;

        self.send(OutboundEnvelope::processing(ProcessingStatus::Start))
            .await?;

        match self.run_turn(data).await {
            Ok(()) => {}
            Err(TurnError::TransportClosed) => return Err(SessionError::TransportClosed),
            Err(e) => {
                tracing::warn!(connection_id = %self.connection_id, error = %e, "turn failed");
                self.send(OutboundEnvelope::error(e.to_string())).await?;
            }
        }

        self.state = resume;
        self.send(OutboundEnvelope::processing(ProcessingStatus::End))
            .await
    }

    async fn run_turn(&mut self, data: Option<String>) -> Result<(), TurnError> {
        let data = data.ok_or_else(|| {
            EnvelopeError::Malformed("audio envelope is missing `data`".to_string())
        })?;
        let audio = decode_audio(&data)?;
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(TurnError::AudioTooLarge(audio.len()));
        }

        let services = Arc::clone(&self.services);
        let transcript = self
            .within("transcription", services.stt.transcribe(&audio))
            .await??;
        self.send(OutboundEnvelope::Transcript {
            text: transcript.clone(),
        })
        .await?;

        let reply = if transcript.trim().is_empty() {
            REPROMPT_REPLY.to_string()
        } else {
            self.remember(Role::User, &transcript).await;
            let reply = self.complete(&transcript).await?;
            self.remember(Role::Assistant, &reply).await;
            reply
        };
        self.send(OutboundEnvelope::Response {
            text: reply.clone(),
        })
        .await?;

        let speech = self
            .within("synthesis", services.tts.synthesize(&reply, &self.context.voice))
            .await??;
        self.send(OutboundEnvelope::Audio {
            audio: encode_audio(&speech),
        })
        .await?;
        Ok(())
    }

    /// Runs the language-model stage. A timeout yields the fallback reply.
    async fn complete(&self, transcript: &str) -> Result<String, TurnError> {
        let persona = system_prompt(self.context.user_name.as_deref());
        let provider = self.context.llm_provider.as_str();
        let completion =
            self.services
                .models
                .complete(provider, transcript, &persona, &self.history);

        match tokio::time::timeout(self.services.stage_timeout, completion).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    provider,
                    "completion timed out, using fallback reply"
                );
                Ok(FALLBACK_REPLY.to_string())
            }
        }
    }

    async fn within<T>(
        &self,
        stage: &'static str,
        fut: impl Future<Output = T>,
    ) -> Result<T, TurnError> {
        let limit = self.services.stage_timeout;
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TurnError::Timeout {
                stage,
                seconds: limit.as_secs(),
            })
    }

    async fn load_history(&self, user_id: &str) -> Vec<HistoryEntry> {
        let recent = self
            .services
            .history
            .recent(user_id, self.services.history_window);
        match flatten(self.within("history read", recent).await) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(connection_id = %self.connection_id, user_id, %error, "history unavailable, starting empty");
                Vec::new()
            }
        }
    }

    /// Appends to the user's log when the session knows who it is talking
    /// to. Failures are logged and otherwise ignored.
    async fn remember(&self, role: Role, content: &str) {
        let Some(user_id) = self.context.user_id.as_deref() else {
            return;
        };
        let append = self
            .services
            .history
            .append(user_id, HistoryEntry::now(role, content));
        if let Err(error) = flatten(self.within("history write", append).await) {
            tracing::warn!(connection_id = %self.connection_id, user_id, role = %role, %error, "skipped history write");
        }
    }

    async fn send(&self, envelope: OutboundEnvelope) -> Result<(), SessionError> {
        self.outbound
            .send(encode(&envelope))
            .await
            .map_err(|_| SessionError::TransportClosed)
    }
}

fn flatten<T, E: std::fmt::Display>(result: Result<Result<T, E>, TurnError>) -> Result<T, String> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}
