//! Core error types for minechat

use mc_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the minechat workspace
#[derive(Error, Debug)]
pub enum McError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure kinds that cross a session component boundary.
///
/// Raw transport and decoding errors are normalized into one of these before
/// they leave a component, so the supervisor only has to decide between
/// retrying, giving up, or stopping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Transient network trouble; the supervisor reconnects
    #[error("Connection lost: {0}")]
    Connectivity(String),

    /// The credential is missing or was rejected; never retried
    #[error("{0}")]
    Credential(String),

    /// The component observed cancellation and cleaned up
    #[error("Cancelled")]
    Cancelled,

    /// The outbound queue was closed by its producer
    #[error("Outbound queue closed")]
    Shutdown,
}

impl SessionError {
    /// Create a connectivity failure
    pub fn connectivity(reason: impl Into<String>) -> Self {
        SessionError::Connectivity(reason.into())
    }

    /// Create a credential failure
    pub fn credential(reason: impl Into<String>) -> Self {
        SessionError::Credential(reason.into())
    }

    /// Whether the failure must terminate the client
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Credential(_))
    }

    /// Whether the supervisor should start a new generation
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Connectivity(_))
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Connectivity(err.to_string())
    }
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        SessionError::Connectivity(err.to_string())
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
