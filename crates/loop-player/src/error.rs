//! Engine error taxonomy.
//!
//! Every variant is recoverable: the operation that produced it leaves the player and the
//! transport exactly as they were.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed buffer or out-of-range configuration.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Audio longer than the playable cap.
    #[error("audio is {seconds:.3}s long, the limit is {max_seconds:.3}s")]
    UnsupportedDuration { seconds: f64, max_seconds: f64 },

    /// Play requested with nothing opened.
    #[error("no source loaded")]
    NoSourceLoaded,

    /// The decoder could not read the container or codec.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The audio thread is not draining commands (stream not running or stalled).
    #[error("command queue is full")]
    Busy,
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_error_mentions_both_lengths() {
        let err = EngineError::UnsupportedDuration {
            seconds: 2.5,
            max_seconds: 2.0,
        };
        assert_eq!(err.to_string(), "audio is 2.500s long, the limit is 2.000s");
    }

    #[test]
    fn io_errors_convert() {
        let err: EngineError = std::io::Error::other("boom").into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
