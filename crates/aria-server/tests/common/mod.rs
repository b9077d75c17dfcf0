//! Scripted providers and helpers shared by the server integration tests.

#![allow(dead_code)]

use aria_db::{HistoryCache, HistoryError};
use aria_server::services::VoiceServices;
use aria_server::session::VoiceSession;
use aria_server::{app, AppState};
use aria_types::{encode_audio, HistoryEntry, VoicePreferences};
use aria_voice::{LanguageModel, LanguageModels, LlmProvider, SpeechToText, TextToSpeech, VoiceError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use uuid::Uuid;

/// What a scripted provider does on one call.
#[derive(Debug, Clone)]
pub enum Step {
    Ok(String),
    Fail(String),
    Unconfigured,
    /// Returns the input: the audio as text, the prompt, or the text as audio.
    Echo,
    /// Never completes.
    Hang,
}

impl Step {
    pub fn ok(text: &str) -> Self {
        Self::Ok(text.to_string())
    }
}

/// Steps are consumed in order; the last one repeats forever.
struct Script(Mutex<VecDeque<Step>>);

impl Script {
    fn new(steps: Vec<Step>) -> Self {
        assert!(!steps.is_empty(), "a script needs at least one step");
        Self(Mutex::new(steps.into()))
    }

    fn next(&self) -> Step {
        let mut steps = self.0.lock().unwrap();
        if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().cloned().unwrap()
        }
    }
}

pub struct FakeStt {
    script: Script,
    pub calls: Mutex<Vec<Vec<u8>>>,
}

impl FakeStt {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Script::new(steps),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        self.calls.lock().unwrap().push(audio.to_vec());
        match self.script.next() {
            Step::Ok(text) => Ok(text),
            Step::Fail(reason) => Err(VoiceError::TranscriptionFailed(reason)),
            Step::Unconfigured => Err(VoiceError::ProviderUnconfigured("groq")),
            Step::Echo => Ok(String::from_utf8_lossy(audio).into_owned()),
            Step::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelCall {
    pub prompt: String,
    pub system_prompt: String,
    pub history: Vec<HistoryEntry>,
}

pub struct FakeModel {
    script: Script,
    pub calls: Mutex<Vec<ModelCall>>,
}

impl FakeModel {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Script::new(steps),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> ModelCall {
        self.calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("model was never called")
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<String, VoiceError> {
        self.calls.lock().unwrap().push(ModelCall {
            prompt: prompt.to_string(),
            system_prompt: system_prompt.to_string(),
            history: history.to_vec(),
        });
        match self.script.next() {
            Step::Ok(text) => Ok(text),
            Step::Fail(reason) => Err(VoiceError::CompletionFailed {
                provider: "claude",
                reason,
            }),
            Step::Unconfigured => Err(VoiceError::ProviderUnconfigured("claude")),
            Step::Echo => Ok(format!("you said {prompt}")),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// Synthesizes the UTF-8 bytes of the scripted text.
pub struct FakeTts {
    script: Script,
    pub calls: Mutex<Vec<(String, VoicePreferences)>>,
}

impl FakeTts {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Script::new(steps),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextToSpeech for FakeTts {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoicePreferences,
    ) -> Result<Vec<u8>, VoiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), voice.clone()));
        match self.script.next() {
            Step::Ok(audio) => Ok(audio.into_bytes()),
            Step::Fail(reason) => Err(VoiceError::SynthesisFailed(reason)),
            Step::Unconfigured => Err(VoiceError::ProviderUnconfigured("azure")),
            Step::Echo => Ok(text.as_bytes().to_vec()),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// In-process history that counts how often it is touched.
#[derive(Default)]
pub struct MemoryHistory {
    logs: Mutex<HashMap<String, Vec<HistoryEntry>>>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl MemoryHistory {
    pub fn seed(&self, user_id: &str, entries: Vec<HistoryEntry>) {
        self.logs
            .lock()
            .unwrap()
            .insert(user_id.to_string(), entries);
    }

    pub fn log(&self, user_id: &str) -> Vec<HistoryEntry> {
        self.logs
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryCache for MemoryHistory {
    async fn append(&self, user_id: &str, entry: HistoryEntry) -> Result<(), HistoryError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.logs
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let log = self.log(user_id);
        let skip = log.len().saturating_sub(limit);
        Ok(log.into_iter().skip(skip).collect())
    }
}

/// A history store that is always down.
pub struct FailingHistory;

#[async_trait]
impl HistoryCache for FailingHistory {
    async fn append(&self, _: &str, _: HistoryEntry) -> Result<(), HistoryError> {
        Err(HistoryError::CacheUnavailable("connection refused".to_string()))
    }

    async fn recent(&self, _: &str, _: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        Err(HistoryError::CacheUnavailable("connection refused".to_string()))
    }
}

/// Scripted providers wired into one set of services.
pub struct Harness {
    pub stt: Arc<FakeStt>,
    pub model: Arc<FakeModel>,
    pub tts: Arc<FakeTts>,
    pub history: Arc<MemoryHistory>,
}

impl Harness {
    /// Transcribes "what time is it", answers "It is noon." and speaks
    /// "mp3-bytes".
    pub fn new() -> Self {
        Self::scripted(
            vec![Step::ok("what time is it")],
            vec![Step::ok("It is noon.")],
            vec![Step::ok("mp3-bytes")],
        )
    }

    pub fn scripted(stt: Vec<Step>, model: Vec<Step>, tts: Vec<Step>) -> Self {
        Self {
            stt: Arc::new(FakeStt::new(stt)),
            model: Arc::new(FakeModel::new(model)),
            tts: Arc::new(FakeTts::new(tts)),
            history: Arc::new(MemoryHistory::default()),
        }
    }

    pub fn services(&self) -> VoiceServices {
        self.services_with_history(self.history.clone())
    }

    /// Only the `claude` slot is filled; `gemini` and `openai` resolve to
    /// unknown providers.
    pub fn services_with_history(&self, history: Arc<dyn HistoryCache>) -> VoiceServices {
        let models = LanguageModels::new().with(LlmProvider::Claude, self.model.clone());
        VoiceServices::new(self.stt.clone(), models, self.tts.clone(), history)
    }

    pub fn session(&self) -> (VoiceSession, mpsc::Receiver<String>) {
        session_with(self.services())
    }
}

pub fn session_with(services: VoiceServices) -> (VoiceSession, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(64);
    (VoiceSession::new(Uuid::new_v4(), Arc::new(services), tx), rx)
}

/// Everything the session has queued so far, parsed.
pub fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).expect("outbound frame is JSON"));
    }
    frames
}

/// The `type` tags of `frames`, with processing frames spelled
/// `processing:start` / `processing:end`.
pub fn kinds(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| {
            let kind = frame["type"].as_str().unwrap_or_default();
            match frame["status"].as_str() {
                Some(status) => format!("{kind}:{status}"),
                None => kind.to_string(),
            }
        })
        .collect()
}

pub fn context_frame(data: Value) -> String {
    json!({ "type": "context", "data": data }).to_string()
}

pub fn audio_frame(bytes: &[u8]) -> String {
    json!({ "type": "audio", "data": encode_audio(bytes) }).to_string()
}

pub const FULL_TURN: [&str; 5] = [
    "processing:start",
    "transcript",
    "response",
    "audio",
    "processing:end",
];

/// Serves the full router on an ephemeral port.
pub async fn spawn_app(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    addr
}
