//! Shared types for the ARIA voice gateway.
//!
//! This crate holds the wire protocol spoken on the voice WebSocket
//! ([`envelope`]), the voice preference model ([`voice`]), and the
//! conversation history entry ([`history`]). It has no I/O of its own so
//! that every other crate in the workspace can depend on it.

pub mod envelope;
pub mod history;
pub mod voice;

pub use envelope::{
    decode, decode_audio, encode, encode_audio, ContextData, EnvelopeError, InboundEnvelope,
    OutboundEnvelope, ProcessingStatus,
};
pub use history::{HistoryEntry, Role};
pub use voice::{VoicePreferences, DEFAULT_VOICE_NAME};

/// Name reported by the service endpoints.
pub const SERVICE_NAME: &str = "ARIA Agent";

/// Message carried by the `ready` envelope.
pub const READY_MESSAGE: &str = "Voice service ready";
