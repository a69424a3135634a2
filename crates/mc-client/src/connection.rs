//! Framed TCP connections to the chat server

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use mc_core::SessionError;
use mc_protocol::{ChatCodec, Outgoing};

/// A byte stream framed with the chat codec
pub type ChatConnection<T> = Framed<T, ChatCodec>;

/// Open a TCP connection to `address` within `timeout`
pub async fn connect(
    address: &str,
    timeout: Duration,
) -> Result<ChatConnection<TcpStream>, SessionError> {
    tracing::debug!("Connecting to {}", address);
    let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| SessionError::connectivity(format!("Connection to {} timed out", address)))?
        .map_err(|e| {
            SessionError::connectivity(format!("Failed to connect to {}: {}", address, e))
        })?;

    Ok(Framed::new(stream, ChatCodec::new()))
}

/// Read the next line; end of stream is a connectivity failure
pub async fn read_line<T>(conn: &mut ChatConnection<T>) -> Result<String, SessionError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match conn.next().await {
        Some(Ok(line)) => Ok(line),
        Some(Err(e)) => Err(e.into()),
        None => Err(SessionError::connectivity("server closed connection")),
    }
}

/// Write one frame and flush it
pub async fn write_frame<T>(conn: &mut ChatConnection<T>, frame: Outgoing) -> Result<(), SessionError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    conn.send(frame).await.map_err(SessionError::from)
}

/// Shut the connection down; errors are irrelevant at this point
pub async fn close<T>(conn: ChatConnection<T>)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut io = conn.into_inner();
    if let Err(e) = io.shutdown().await {
        tracing::trace!("Ignoring error while closing connection: {}", e);
    }
}
