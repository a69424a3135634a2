//! Inbound broadcast session

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use mc_core::traits::{LineSink, StatusSink};
use mc_core::{LivenessEvent, SessionError};

use super::{Channel, ConnectionStatus};
use crate::connection::{self, ChatConnection};
use crate::watchdog::LivenessSender;

/// Reads the broadcast stream of one generation.
///
/// No retries happen here; the supervisor owns restart policy.
pub struct ReadSession {
    address: String,
    connect_timeout: Duration,
    display: Arc<dyn LineSink>,
    history: Arc<dyn LineSink>,
    status: Arc<dyn StatusSink>,
    liveness: LivenessSender,
}

impl ReadSession {
    /// Create a read session for `address`
    pub fn new(
        address: impl Into<String>,
        connect_timeout: Duration,
        display: Arc<dyn LineSink>,
        history: Arc<dyn LineSink>,
        status: Arc<dyn StatusSink>,
        liveness: LivenessSender,
    ) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            display,
            history,
            status,
            liveness,
        }
    }

    /// Connect and deliver lines until cancelled or the server closes the stream.
    ///
    /// Never returns `Ok`: a closed stream is a connectivity failure.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SessionError> {
        let connection_status = ConnectionStatus::initiated(Arc::clone(&self.status), Channel::Read);

        let mut conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            conn = connection::connect(&self.address, self.connect_timeout) => conn?,
        };

        connection_status.established();
        self.liveness.emit(LivenessEvent::ReadEstablished);
        tracing::info!("Read connection established to {}", self.address);

        let result = self.read_lines(&mut conn, &cancel).await;
        connection::close(conn).await;

        match &result {
            Err(SessionError::Cancelled) => tracing::debug!("Read session cancelled"),
            Err(e) => tracing::info!("Read session ended: {}", e),
            Ok(()) => {}
        }
        result
    }

    /// Deliver each line to the display and the history sink, in arrival order
    pub async fn read_lines<T>(
        &self,
        conn: &mut ChatConnection<T>,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                next = conn.next() => next,
            };

            match next {
                Some(Ok(line)) => {
                    self.display.push(&line);
                    self.history.push(&line);
                    self.liveness.emit(LivenessEvent::ChatReceived);
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(SessionError::connectivity("server closed read stream")),
            }
        }
    }
}
