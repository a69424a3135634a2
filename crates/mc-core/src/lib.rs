//! mc-core: Core abstractions and configuration for minechat
//!
//! Shared types, error taxonomy, collaborator traits and configuration used
//! by the session engine and the command-line client.

pub mod config;
pub mod credential;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{McError, SessionError};
pub use types::{ConnectionState, Credential, Identity, LivenessEvent, StatusUpdate};
