//! Error types for the narration crate

/// Errors that can occur while preparing or playing a segment
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No segment with this id in the loaded content
    #[error("Segment not found: {0}")]
    SegmentNotFound(String),

    /// Narration audio could not be resolved for the segment
    #[error("Narration unavailable for segment {segment}: {reason}")]
    SegmentUnavailable { segment: String, reason: String },

    /// Voice synthesis did not answer within the budget
    #[error("Voice synthesis timed out after {0:?}")]
    SynthesisTimeout(std::time::Duration),

    /// Voice synthesis provider failed
    #[error("Voice synthesis failed: {0}")]
    Synthesis(String),

    /// Content failed validation at load time
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from the audio engine
    #[error("Audio error: {0}")]
    Audio(#[from] oldtom_audio::Error),
}

/// Result type for narration operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if the host should offer "try again"
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SynthesisTimeout(_) | Error::Synthesis(_) | Error::SegmentUnavailable { .. }
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::InvalidContent(err.to_string())
    }
}
