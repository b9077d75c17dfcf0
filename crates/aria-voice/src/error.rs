use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("unknown language model provider: {0}")]
    UnknownProvider(String),

    /// The provider's credential is absent from the configuration.
    #[error("provider `{0}` is not configured")]
    ProviderUnconfigured(&'static str),

    /// The language model returned an error or an unusable body.
    #[error("{provider} completion failed: {reason}")]
    CompletionFailed {
        provider: &'static str,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}
