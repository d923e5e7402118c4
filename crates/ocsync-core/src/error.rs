//! Error types for opencode-sync.
//!
//! Decoding failures are the only errors the state layer surfaces to callers.
//! Unknown discriminants, rejected transitions and missing owners degrade
//! gracefully and are reported through store outcomes instead.

use thiserror::Error;

/// Result type alias using the crate-wide [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Structural decode failure: the bytes were not valid JSON, or a field the
/// record cannot exist without was absent or malformed.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Malformed JSON or a value of the wrong shape
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field was absent
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field was present but unusable
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl DecodeError {
    /// Create an invalid-field error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Main error type for opencode-sync.
#[derive(Error, Debug)]
pub enum Error {
    /// Payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The event transport failed
    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Error::Decode(_) => "Drop the record and refetch the session from the server",
            Error::Config(_) => "Check your config file at ~/.config/opencode-sync/config.toml",
            Error::Transport(_) => "Reconnect the event stream and refetch full session state",
        }
    }
}

/// Format an error with its recovery suggestion.
pub fn format_error_with_suggestion(error: &Error) -> String {
    format!(
        "{}\n  Suggestion: {}",
        error,
        error.recovery_suggestion()
    )
}
