//! Token file storage
//!
//! The token file is the JSON object the server returns on registration:
//! `{"nickname": "...", "account_hash": "..."}`.

use async_trait::async_trait;
use mc_protocol::Account;
use std::path::{Path, PathBuf};

use crate::config::expand_home;
use crate::error::{McError, SessionError};
use crate::traits::CredentialStore;
use crate::types::Credential;

/// Credential store backed by a JSON token file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store for the given path; a leading `~` is expanded
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: expand_home(path.as_ref()),
        }
    }

    /// Resolved path of the token file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a token file already exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write an account to the token file, creating parent directories
    pub async fn save(&self, account: &Account) -> Result<(), McError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string(account).map_err(mc_protocol::ProtocolError::from)?;
        tokio::fs::write(&self.path, content).await?;
        tracing::info!("Token saved to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Credential, SessionError> {
        if !self.path.exists() {
            return Err(SessionError::credential(format!(
                "Token not found at {}. Register first with `minechat register`.",
                self.path.display()
            )));
        }

        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SessionError::credential(format!("Failed to read token {}: {}", self.path.display(), e))
        })?;

        let account: Account = serde_json::from_str(&content).map_err(|e| {
            SessionError::credential(format!("Failed to read token {}: {}", self.path.display(), e))
        })?;

        tracing::debug!("Loaded token from {}", self.path.display());
        Ok(Credential::new(account.account_hash))
    }
}
