//! Credential store trait

use async_trait::async_trait;

use crate::error::SessionError;
use crate::types::Credential;

/// Read-only source of the account credential
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the credential.
    ///
    /// A missing or unreadable credential is a [`SessionError::Credential`]:
    /// retrying a connection cannot fix it.
    async fn load(&self) -> Result<Credential, SessionError>;
}
