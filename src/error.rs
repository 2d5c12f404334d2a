use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, DictError>;

/// Enum representing all possible errors in the wordbook_rs library.
#[derive(Error, Debug)]
pub enum DictError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The text-to-speech upstream could not produce audio.
    #[error("upstream TTS service unavailable: {0}")]
    TtsUnavailable(String),

    /// The translation upstream answered with something other than a payload.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Data directory not found or could not be determined")]
    DataDirNotFound,

    #[error("Internal error: {0}")]
    Internal(String), // For unexpected situations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tts_message_carries_cause() {
        let err = DictError::TtsUnavailable("connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "upstream TTS service unavailable: connection refused"
        );
    }

    #[test]
    fn test_json_error_converts() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: DictError = parse_err.into();
        assert!(matches!(err, DictError::Json(_)));
    }
}
