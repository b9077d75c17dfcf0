//! Voice preference definitions.
//!
//! A client may send any subset of the preference fields in its `context`
//! event; missing fields fall back to the defaults below one by one.

use serde::{Deserialize, Serialize};

/// Voice used when the client does not name one.
pub const DEFAULT_VOICE_NAME: &str = "en-US-AriaNeural";

/// Neutral value on the linear 0.5–2.0 adjustment scale.
pub const NEUTRAL_ADJUSTMENT: f32 = 1.0;

fn default_voice_name() -> String {
    DEFAULT_VOICE_NAME.to_string()
}

fn neutral() -> f32 {
    NEUTRAL_ADJUSTMENT
}

/// Per-session synthesis preferences.
///
/// `pitch` and `rate` are expressed on a linear scale where 1.0 means "no
/// adjustment" and the useful range is 0.5–2.0. `volume` uses the same
/// convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePreferences {
    /// Provider voice identifier (e.g. `en-US-AriaNeural`).
    #[serde(default = "default_voice_name")]
    pub name: String,
    /// Pitch multiplier.
    #[serde(default = "neutral")]
    pub pitch: f32,
    /// Speaking rate multiplier.
    #[serde(default = "neutral")]
    pub rate: f32,
    /// Volume multiplier.
    #[serde(default = "neutral")]
    pub volume: f32,
}

impl Default for VoicePreferences {
    fn default() -> Self {
        Self {
            name: default_voice_name(),
            pitch: NEUTRAL_ADJUSTMENT,
            rate: NEUTRAL_ADJUSTMENT,
            volume: NEUTRAL_ADJUSTMENT,
        }
    }
}

impl VoicePreferences {
    /// Preferences for the given voice with every adjustment left neutral.
    pub fn with_voice(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
