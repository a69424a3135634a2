//! Collaborator traits consumed by the session engine

mod credential;
mod sink;

pub use credential::CredentialStore;
pub use sink::{LineSink, StatusSink};
