use thiserror::Error;

/// Everything that can go wrong inside the engine.
///
/// Only [`EngineError::AudioInit`] ever reaches the UI as a failure; the
/// other variants are musical-input errors that the [`crate::engine::Engine`]
/// facade logs and turns into no-ops.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Note name is empty or not in the note table.
    #[error("unknown note '{0}'")]
    UnknownNote(String),

    /// The audio output is closed.
    #[error("audio output unavailable")]
    AudioUnavailable,

    /// Step index outside the editable range.
    #[error("step index {index} out of range (limit {limit})")]
    InvalidStepIndex { index: usize, limit: usize },

    /// Tempo must be a positive number of beats per minute.
    #[error("invalid tempo {0} bpm")]
    InvalidTempo(u32),

    /// A configuration value failed validation.
    #[error("invalid parameter '{param}': {reason}")]
    InvalidParameter { param: &'static str, reason: String },

    /// Writing rendered audio to a file format failed.
    #[error("failed to encode audio: {0}")]
    Encode(String),

    /// The audio output could not be created at startup.
    #[error("failed to initialize audio output: {0}")]
    AudioInit(String),
}

impl EngineError {
    pub(crate) fn invalid_parameter(param: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            param,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_note_display() {
        let err = EngineError::UnknownNote("H3".to_string());
        assert_eq!(err.to_string(), "unknown note 'H3'");
    }

    #[test]
    fn step_index_display() {
        let err = EngineError::InvalidStepIndex { index: 9, limit: 8 };
        assert_eq!(err.to_string(), "step index 9 out of range (limit 8)");
    }

    #[test]
    fn invalid_parameter_factory() {
        let err = EngineError::invalid_parameter("masterVolume", "must be within [0, 1]");
        assert!(
            matches!(err, EngineError::InvalidParameter { param: "masterVolume", .. }),
            "got: {err:?}"
        );
        assert_eq!(
            err.to_string(),
            "invalid parameter 'masterVolume': must be within [0, 1]"
        );
    }
}
