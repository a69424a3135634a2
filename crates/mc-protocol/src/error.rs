//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A line grew past the configured limit without a terminator
    #[error("Line too long: {len} bytes exceeds maximum of {max} bytes")]
    LineTooLong { len: usize, max: usize },

    /// The server answered with something the handshake cannot use
    #[error("Unexpected server reply: {0}")]
    UnexpectedReply(String),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
