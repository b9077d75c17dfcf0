//! Wire protocol for the `/voice/stream` WebSocket.
//!
//! Every text frame carries exactly one JSON envelope of the form
//! `{"type": "...", ...fields}`. Inbound and outbound envelopes are separate
//! closed enums so the session handler can match them exhaustively.

use crate::voice::VoicePreferences;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Errors produced while decoding client frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The frame is not a well-formed envelope, or a payload inside it
    /// cannot be decoded.
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

/// Client-supplied session context carried by a `context` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub household_id: Option<String>,
    /// Display name used to personalize the assistant persona.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Language-model provider name (`claude`, `gemini`, `openai`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_preferences: Option<VoicePreferences>,
}

/// Envelopes sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundEnvelope {
    /// Sets or replaces the session context.
    Context {
        #[serde(default)]
        data: Option<ContextData>,
    },
    /// One complete utterance, base64-encoded.
    Audio {
        #[serde(default)]
        data: Option<String>,
    },
    /// Any `type` this server does not understand.
    #[serde(other)]
    Unknown,
}

/// Turn framing marker carried by `processing` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Start,
    End,
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

/// Envelopes sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundEnvelope {
    Ready { message: String },
    Processing { status: ProcessingStatus },
    Transcript { text: String },
    Response { text: String },
    Audio { audio: String },
    Error { message: String },
}

impl OutboundEnvelope {
    pub fn processing(status: ProcessingStatus) -> Self {
        Self::Processing { status }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns the `type` tag of this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Processing { .. } => "processing",
            Self::Transcript { .. } => "transcript",
            Self::Response { .. } => "response",
            Self::Audio { .. } => "audio",
            Self::Error { .. } => "error",
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Ready { message } => json!({ "type": "ready", "message": message }),
            Self::Processing { status } => {
                json!({ "type": "processing", "status": status.as_str() })
            }
            Self::Transcript { text } => json!({ "type": "transcript", "text": text }),
            Self::Response { text } => json!({ "type": "response", "text": text }),
            Self::Audio { audio } => json!({ "type": "audio", "audio": audio }),
            Self::Error { message } => json!({ "type": "error", "message": message }),
        }
    }
}

/// Parses one inbound text frame.
///
/// # Errors
///
/// Returns `EnvelopeError::Malformed` if the frame is not a JSON object with
/// a string `type`, or if a known variant carries fields of the wrong shape.
pub fn decode(raw: &str) -> Result<InboundEnvelope, EnvelopeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    match value.get("type") {
        Some(Value::String(_)) => {}
        Some(_) => {
            return Err(EnvelopeError::Malformed(
                "field `type` must be a string".to_string(),
            ))
        }
        None => return Err(EnvelopeError::Malformed("missing field `type`".to_string())),
    }

    serde_json::from_value(value).map_err(|e| EnvelopeError::Malformed(e.to_string()))
}

/// Serializes one outbound envelope to a text frame.
pub fn encode(envelope: &OutboundEnvelope) -> String {
    envelope.to_value().to_string()
}

/// Base64-encodes audio bytes for an outbound `audio` envelope.
pub fn encode_audio(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decodes the base64 payload of an inbound `audio` envelope.
///
/// # Errors
///
/// Returns `EnvelopeError::Malformed` if the payload is not valid standard
/// base64.
pub fn decode_audio(data: &str) -> Result<Vec<u8>, EnvelopeError> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| EnvelopeError::Malformed(format!("invalid base64 audio: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_context_with_camel_case_fields() {
        let raw = r#"{
            "type": "context",
            "data": {
                "userId": "u1",
                "householdId": "h1",
                "userName": "Sam",
                "llmProvider": "openai",
                "voicePreferences": {"name": "en-US-GuyNeural", "pitch": 1.5}
            }
        }"#;

        let InboundEnvelope::Context { data: Some(data) } = decode(raw).unwrap() else {
            panic!("expected context envelope with data");
        };
        assert_eq!(data.user_id.as_deref(), Some("u1"));
        assert_eq!(data.household_id.as_deref(), Some("h1"));
        assert_eq!(data.user_name.as_deref(), Some("Sam"));
        assert_eq!(data.llm_provider.as_deref(), Some("openai"));
        let prefs = data.voice_preferences.unwrap();
        assert_eq!(prefs.name, "en-US-GuyNeural");
        assert_eq!(prefs.pitch, 1.5);
        assert_eq!(prefs.rate, 1.0);
    }

    #[test]
    fn decode_context_without_data() {
        assert_eq!(
            decode(r#"{"type":"context"}"#).unwrap(),
            InboundEnvelope::Context { data: None }
        );
    }

    #[test]
    fn decode_audio_envelope() {
        assert_eq!(
            decode(r#"{"type":"audio","data":"AAEC"}"#).unwrap(),
            InboundEnvelope::Audio {
                data: Some("AAEC".to_string())
            }
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        assert_eq!(
            decode(r#"{"type":"ping","nonce":7}"#).unwrap(),
            InboundEnvelope::Unknown
        );
    }

    #[test]
    fn malformed_frames_are_rejected() {
        for raw in [
            "not json",
            "[1,2,3]",
            r#"{"data":"AAEC"}"#,
            r#"{"type":42}"#,
            r#"{"type":"audio","data":17}"#,
            r#"{"type":"context","data":{"userId":5}}"#,
        ] {
            assert!(
                matches!(decode(raw), Err(EnvelopeError::Malformed(_))),
                "expected {raw:?} to be malformed"
            );
        }
    }

    #[test]
    fn outbound_envelopes_carry_type_tag() {
        let frame = encode(&OutboundEnvelope::processing(ProcessingStatus::Start));
        let json: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json, json!({"type": "processing", "status": "start"}));

        let frame = encode(&OutboundEnvelope::Audio {
            audio: "AAEC".to_string(),
        });
        let json: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json, json!({"type": "audio", "audio": "AAEC"}));
    }

    #[test]
    fn encoded_frames_parse_back_as_outbound() {
        let envelopes = [
            OutboundEnvelope::Ready {
                message: "Voice service ready".to_string(),
            },
            OutboundEnvelope::processing(ProcessingStatus::End),
            OutboundEnvelope::Transcript {
                text: String::new(),
            },
            OutboundEnvelope::error("boom"),
        ];
        for envelope in envelopes {
            let parsed: OutboundEnvelope = serde_json::from_str(&encode(&envelope)).unwrap();
            assert_eq!(parsed, envelope);
        }
    }

    #[test]
    fn audio_base64_survives_arbitrary_bytes() {
        let samples: [&[u8]; 4] = [b"", &[0], &[0xff, 0x00, 0x7f, 0x80, 0x01], &[0xAB; 1027]];
        for bytes in samples {
            assert_eq!(decode_audio(&encode_audio(bytes)).unwrap(), bytes);
        }

        let all: Vec<u8> = (0..=255u8).collect();
        assert_eq!(decode_audio(&encode_audio(&all)).unwrap(), all);
    }

    #[test]
    fn invalid_base64_is_malformed() {
        assert!(matches!(
            decode_audio("@@not-base64@@"),
            Err(EnvelopeError::Malformed(_))
        ));
    }
}
