//! Outbound submission session

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use mc_core::config::ClientConfig;
use mc_core::traits::StatusSink;
use mc_core::{Credential, LivenessEvent, SessionError};
use mc_protocol::Outgoing;

use super::{Channel, ConnectionStatus};
use crate::auth::authenticate;
use crate::connection::{self, read_line, write_frame, ChatConnection};
use crate::watchdog::LivenessSender;

/// Queue of user messages waiting to be sent.
///
/// It outlives generations: a send session holds the lock for its lifetime,
/// and whatever it has not taken yet is left for the next one.
pub type OutboundQueue = Arc<Mutex<mpsc::Receiver<String>>>;

/// Wrap the receiving end of the outbound channel
pub fn outbound_queue(rx: mpsc::Receiver<String>) -> OutboundQueue {
    Arc::new(Mutex::new(rx))
}

/// Authenticates on the send port, then submits queued messages and heartbeats
pub struct SendSession {
    address: String,
    connect_timeout: Duration,
    heartbeat_interval: Duration,
    ack_timeout: Duration,
    credential: Credential,
    status: Arc<dyn StatusSink>,
    liveness: LivenessSender,
}

impl SendSession {
    /// Create a send session from configuration
    pub fn new(
        config: &ClientConfig,
        credential: Credential,
        status: Arc<dyn StatusSink>,
        liveness: LivenessSender,
    ) -> Self {
        Self {
            address: config.send_address(),
            connect_timeout: config.connect_timeout,
            heartbeat_interval: config.heartbeat_interval,
            ack_timeout: config.ack_timeout,
            credential,
            status,
            liveness,
        }
    }

    /// Connect, authenticate and serve the outbound queue until failure or cancellation.
    ///
    /// A rejected credential comes back unchanged as [`SessionError::Credential`];
    /// a closed outbound channel ends the session with [`SessionError::Shutdown`].
    pub async fn run(self, outbound: OutboundQueue, cancel: CancellationToken) -> Result<(), SessionError> {
        let connection_status = ConnectionStatus::initiated(Arc::clone(&self.status), Channel::Send);

        let mut conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            conn = connection::connect(&self.address, self.connect_timeout) => conn?,
        };

        let result = self
            .authenticated(&mut conn, &outbound, &connection_status, &cancel)
            .await;
        connection::close(conn).await;

        match &result {
            Err(SessionError::Cancelled) => tracing::debug!("Send session cancelled"),
            Err(e) => tracing::info!("Send session ended: {}", e),
            Ok(()) => {}
        }
        result
    }

    async fn authenticated<T>(
        &self,
        conn: &mut ChatConnection<T>,
        outbound: &OutboundQueue,
        connection_status: &ConnectionStatus,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let identity = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            identity = authenticate(conn, &self.credential, &self.liveness) => identity?,
        };
        tracing::info!("Send connection authenticated as {}", identity);
        connection_status.established();

        let mut outbound = outbound.lock().await;
        self.serve(conn, &mut outbound, cancel).await
    }

    /// Post-authentication loop on an already authenticated connection.
    ///
    /// Messages go out in queue order; a heartbeat is sent only when the queue
    /// stays empty for a whole heartbeat interval. Every transmission must be
    /// answered by a prompt line within the ack timeout.
    pub async fn serve<T>(
        &self,
        conn: &mut ChatConnection<T>,
        outbound: &mut mpsc::Receiver<String>,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.liveness.emit(LivenessEvent::SendEstablished);
        self.expect_prompt(conn, "no initial prompt after auth", cancel).await?;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                next = tokio::time::timeout(self.heartbeat_interval, outbound.recv()) => next,
            };

            let (frame, missing_ack) = match next {
                Ok(Some(text)) => {
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    (Outgoing::Submission(text.to_string()), "no prompt after message")
                }
                Ok(None) => return Err(SessionError::Shutdown),
                Err(_idle) => {
                    tracing::trace!("Outbound queue idle, sending heartbeat");
                    (Outgoing::heartbeat(), "ping ack timeout")
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                written = write_frame(conn, frame) => written?,
            }
            self.liveness.emit(LivenessEvent::MessageSent);

            self.expect_prompt(conn, missing_ack, cancel).await?;
        }
    }

    async fn expect_prompt<T>(
        &self,
        conn: &mut ChatConnection<T>,
        missing: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let prompt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            prompt = tokio::time::timeout(self.ack_timeout, read_line(conn)) => prompt,
        };

        match prompt {
            Ok(line) => {
                let line = line?;
                tracing::trace!("Prompt: {}", line);
                self.liveness.emit(LivenessEvent::ChatReceived);
                Ok(())
            }
            Err(_elapsed) => Err(SessionError::connectivity(missing)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchdog::liveness_channel;
    use mc_protocol::ChatCodec;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::time::Instant;
    use tokio_util::codec::Framed;

    const PROMPT: &[u8] = b"Post your message below. End it with an empty line.\n";

    fn session() -> (SendSession, mpsc::UnboundedReceiver<LivenessEvent>) {
        let (status_tx, _status_rx) = mpsc::unbounded_channel();
        let (liveness, events) = liveness_channel();
        let session = SendSession::new(
            &ClientConfig::default(),
            Credential::new("abc"),
            Arc::new(status_tx),
            liveness,
        );
        (session, events)
    }

    /// Read exactly `len` bytes written by the client
    async fn read_bytes(server: &mut DuplexStream, len: usize) -> String {
        let mut buf = vec![0u8; len];
        server.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_then_heartbeat() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let (session, mut events) = session();

        let server = tokio::spawn(async move {
            let mut server = server_io;
            server.write_all(PROMPT).await.unwrap();

            let message = read_bytes(&mut server, 7).await;
            server.write_all(PROMPT).await.unwrap();
            let sent_at = Instant::now();

            let heartbeat = read_bytes(&mut server, 2).await;
            let idle = sent_at.elapsed();
            server.write_all(PROMPT).await.unwrap();
            (message, heartbeat, idle)
        });

        outbound_tx.send("  hello  ".to_string()).await.unwrap();

        let cancel = CancellationToken::new();
        let mut conn = Framed::new(client_io, ChatCodec::new());
        let client = session.serve(&mut conn, &mut outbound_rx, &cancel);

        let (result, served) = tokio::join!(client, async {
            let served = server.await.unwrap();
            // Let the client consume the last prompt before stopping it
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
            served
        });

        let (message, heartbeat, idle) = served;
        assert_eq!(message, "hello\n\n");
        assert_eq!(heartbeat, "\n\n");
        assert!(idle >= Duration::from_secs(5));
        assert_eq!(result, Err(SessionError::Cancelled));

        let mut sent = 0;
        while let Ok(event) = events.try_recv() {
            if event == LivenessEvent::MessageSent {
                sent += 1;
            }
        }
        assert_eq!(sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_messages_are_discarded() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let (session, _events) = session();

        outbound_tx.send("   ".to_string()).await.unwrap();
        outbound_tx.send(String::new()).await.unwrap();
        outbound_tx.send("real".to_string()).await.unwrap();
        drop(outbound_tx);

        let server = tokio::spawn(async move {
            let mut server = server_io;
            server.write_all(PROMPT).await.unwrap();
            let first = read_bytes(&mut server, 6).await;
            server.write_all(PROMPT).await.unwrap();
            first
        });

        let mut conn = Framed::new(client_io, ChatCodec::new());
        let result = session
            .serve(&mut conn, &mut outbound_rx, &CancellationToken::new())
            .await;

        assert_eq!(server.await.unwrap(), "real\n\n");
        assert_eq!(result, Err(SessionError::Shutdown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ack_is_connectivity_failure() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let (session, _events) = session();
        outbound_tx.send("hello".to_string()).await.unwrap();

        let _server = tokio::spawn(async move {
            let mut server = server_io;
            server.write_all(PROMPT).await.unwrap();
            let _ = read_bytes(&mut server, 7).await;
            // Never acknowledge
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let mut conn = Framed::new(client_io, ChatCodec::new());
        let result = session
            .serve(&mut conn, &mut outbound_rx, &CancellationToken::new())
            .await;

        assert_eq!(result, Err(SessionError::connectivity("no prompt after message")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_heartbeat_ack() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let (_outbound_tx, mut outbound_rx) = mpsc::channel::<String>(8);
        let (session, _events) = session();

        let _server = tokio::spawn(async move {
            let mut server = server_io;
            server.write_all(PROMPT).await.unwrap();
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let mut conn = Framed::new(client_io, ChatCodec::new());
        let result = session
            .serve(&mut conn, &mut outbound_rx, &CancellationToken::new())
            .await;

        assert_eq!(result, Err(SessionError::connectivity("ping ack timeout")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_initial_prompt() {
        let (client_io, _server_io) = tokio::io::duplex(1024);
        let (_outbound_tx, mut outbound_rx) = mpsc::channel::<String>(8);
        let (session, _events) = session();

        let mut conn = Framed::new(client_io, ChatCodec::new());
        let result = session
            .serve(&mut conn, &mut outbound_rx, &CancellationToken::new())
            .await;

        assert_eq!(result, Err(SessionError::connectivity("no initial prompt after auth")));
    }
}
