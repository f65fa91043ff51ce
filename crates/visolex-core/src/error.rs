use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during ViSoLex operations.
#[derive(Debug, Error)]
pub enum VisolexError {
    /// A required input or option is missing or out of range.
    ///
    /// Raised before any training work starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The span cursor produced an offset that does not map back onto the input.
    #[error("alignment error in {text:?}: {detail}")]
    Alignment {
        /// The sentence being aligned.
        text: String,
        /// What went wrong.
        detail: String,
    },

    /// A checkpoint is missing locally and could not be fetched.
    #[error("model unavailable at {}: {reason}", path.display())]
    ModelUnavailable {
        /// Directory the checkpoint was expected in.
        path: PathBuf,
        /// Why loading failed.
        reason: String,
    },

    /// The input string is empty or contains only whitespace.
    #[error("input is empty or whitespace-only")]
    EmptyInput,

    /// The tokenizer collaborator failed.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// The model inference call failed or returned malformed output.
    #[error("inference error: {0}")]
    Inference(String),

    /// A training step failed.
    #[error("training error: {0}")]
    Training(String),

    /// Remote checkpoint download failed.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Candle ML framework error.
    #[error("tensor error: {0}")]
    Candle(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    Regex(#[from] regex::Error),
}

impl VisolexError {
    pub(crate) fn alignment(text: &str, detail: impl Into<String>) -> Self {
        Self::Alignment {
            text: text.to_string(),
            detail: detail.into(),
        }
    }
}

impl From<candle_core::Error> for VisolexError {
    fn from(err: candle_core::Error) -> Self {
        Self::Candle(err.to_string())
    }
}

/// Result type alias for ViSoLex operations.
pub type Result<T> = std::result::Result<T, VisolexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = VisolexError::EmptyInput;
        assert_eq!(err.to_string(), "input is empty or whitespace-only");

        let err = VisolexError::alignment("sao lỗi j", "span 8..12 exceeds 9 characters");
        assert!(err.to_string().contains("sao lỗi j"));
        assert!(err.to_string().contains("8..12"));

        let err = VisolexError::ModelUnavailable {
            path: PathBuf::from("/tmp/ckpt/student_best"),
            reason: "not found".into(),
        };
        assert!(err.to_string().contains("/tmp/ckpt/student_best"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VisolexError>();
    }
}
