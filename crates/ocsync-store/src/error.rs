//! Transport-facing error types.

use ocsync_core::DecodeError;
use thiserror::Error;

/// Errors an event source can yield.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying connection failed.
    #[error("stream error: {0}")]
    Stream(String),

    /// A single record could not be framed. The stream itself is still usable.
    #[error("malformed record: {0}")]
    Malformed(#[from] DecodeError),
}

impl TransportError {
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Whether the source can keep yielding records after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

impl From<TransportError> for ocsync_core::Error {
    fn from(e: TransportError) -> Self {
        ocsync_core::Error::Transport(e.to_string())
    }
}
