//! Auth probe
//!
//! Authenticates on its own send-port connection at the start of each
//! generation so the user learns their nickname, and a revoked token stops the
//! client, even while the send session is still connecting.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use mc_core::traits::StatusSink;
use mc_core::{Credential, SessionError, StatusUpdate};

use crate::auth::authenticate;
use crate::connection;
use crate::watchdog::LivenessSender;

/// One-shot authentication check
pub struct AuthProbe {
    address: String,
    connect_timeout: Duration,
    credential: Credential,
    status: Arc<dyn StatusSink>,
    liveness: LivenessSender,
}

impl AuthProbe {
    /// Create a probe against the send port at `address`
    pub fn new(
        address: impl Into<String>,
        connect_timeout: Duration,
        credential: Credential,
        status: Arc<dyn StatusSink>,
        liveness: LivenessSender,
    ) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            credential,
            status,
            liveness,
        }
    }

    /// Authenticate once, publish the identity and disconnect
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SessionError> {
        let mut conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            conn = connection::connect(&self.address, self.connect_timeout) => conn?,
        };

        let identity = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SessionError::Cancelled),
            identity = authenticate(&mut conn, &self.credential, &self.liveness) => identity,
        };
        connection::close(conn).await;

        let identity = identity?;
        tracing::info!("Logged in as {}", identity);
        self.status.publish(StatusUpdate::IdentityResolved(identity));
        Ok(())
    }
}
