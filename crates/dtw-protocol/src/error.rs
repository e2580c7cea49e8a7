//! Error types for the work protocol channel.

use std::io;

use thiserror::Error;

/// Errors raised while framing requests or responses.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The underlying stream failed. The channel cannot continue.
    #[error("channel I/O error: {0}")]
    Io(#[from] io::Error),

    /// A line arrived that does not decode as a work request. The channel
    /// itself is still usable.
    #[error("malformed request (requestId {request_id}): {message}")]
    Malformed {
        /// Request id recovered from the raw line, or 0.
        request_id: i64,
        message: String,
        /// The offending line, lossily decoded and without its newline.
        line: String,
    },

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Whether the worker can keep reading after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}
