//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Account token presented on the send port.
///
/// The value never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Display name the server reports for an authenticated credential
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(pub String);

impl Identity {
    /// Create a new identity
    pub fn new(nickname: impl Into<String>) -> Self {
        Self(nickname.into())
    }

    /// Get the nickname
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Forward-progress signal consumed by the liveness watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LivenessEvent {
    /// Greeting seen before sending the token
    PromptSeen,
    /// The server accepted the token
    AuthOk,
    /// Inbound connection is open
    ReadEstablished,
    /// Outbound connection is open and authenticated
    SendEstablished,
    /// A line arrived from the server
    ChatReceived,
    /// A submission or heartbeat was written
    MessageSent,
}

impl fmt::Display for LivenessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LivenessEvent::PromptSeen => "Prompt before auth",
            LivenessEvent::AuthOk => "Authorization done",
            LivenessEvent::ReadEstablished => "Read connection established",
            LivenessEvent::SendEstablished => "Send connection established",
            LivenessEvent::ChatReceived => "New message in chat",
            LivenessEvent::MessageSent => "Message sent",
        };
        f.write_str(text)
    }
}

/// State of one of the two sockets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Connecting
    Initiated,
    /// Connected (and authenticated, for the send socket)
    Established,
    /// Closed
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Initiated => write!(f, "connecting"),
            ConnectionState::Established => write!(f, "established"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Observation published to the status sink.
///
/// Purely informational; nothing in the session engine reads these back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Inbound socket changed state
    ReadConnection(ConnectionState),
    /// Outbound socket changed state
    SendConnection(ConnectionState),
    /// The server told us who we are
    IdentityResolved(Identity),
    /// Watchdog saw activity
    Liveness { timestamp: u64, event: LivenessEvent },
    /// Watchdog interval passed without activity
    Idle { misses: u32 },
    /// Supervisor is about to sleep before the next generation
    Reconnecting { reason: String, delay: Duration },
}

impl fmt::Display for StatusUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusUpdate::ReadConnection(state) => write!(f, "read connection {}", state),
            StatusUpdate::SendConnection(state) => write!(f, "send connection {}", state),
            StatusUpdate::IdentityResolved(identity) => write!(f, "logged in as {}", identity),
            StatusUpdate::Liveness { timestamp, event } => {
                write!(f, "[{}] Connection is alive. {}", timestamp, event)
            }
            StatusUpdate::Idle { misses } => write!(f, "No activity for {} interval(s)", misses),
            StatusUpdate::Reconnecting { reason, delay } => {
                write!(f, "Reconnecting in {:?}: {}", delay, reason)
            }
        }
    }
}
