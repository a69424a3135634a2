//! Token handshake and account registration
//!
//! Both exchanges run on a connection supplied by the caller, so the same
//! code serves the send session, the auth probe and the one-shot commands.

use tokio::io::{AsyncRead, AsyncWrite};

use mc_core::{Credential, Identity, LivenessEvent, McError, SessionError};
use mc_protocol::{decode_json_or_null, Account, AuthReply, Outgoing, ProtocolError};

use crate::connection::{read_line, write_frame, ChatConnection};
use crate::watchdog::LivenessSender;

/// Message carried by the credential failure when the server answers `null`
pub const UNKNOWN_TOKEN: &str = "Unknown token. Check it or register again.";

/// Exchange a credential for the account's display name.
///
/// A `null` or unparseable reply is a [`SessionError::Credential`]; a socket
/// error or a closed stream is a [`SessionError::Connectivity`].
pub async fn authenticate<T>(
    conn: &mut ChatConnection<T>,
    credential: &Credential,
    liveness: &LivenessSender,
) -> Result<Identity, SessionError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let greeting = read_line(conn).await?;
    tracing::debug!("{}", greeting);
    liveness.emit(LivenessEvent::PromptSeen);

    write_frame(conn, Outgoing::Line(credential.as_str().to_string())).await?;
    tracing::debug!("<token> (sent)");

    let response = read_line(conn).await?;
    tracing::debug!("{}", response);

    let reply = match decode_json_or_null(&response) {
        Some(object) => AuthReply::from_object(&object),
        None => return Err(SessionError::credential(UNKNOWN_TOKEN)),
    };

    liveness.emit(LivenessEvent::AuthOk);
    Ok(Identity::new(reply.display_name()))
}

/// Register a new account under `nickname`.
///
/// The server may decorate the nickname; the returned account carries the
/// name it actually assigned.
pub async fn register<T>(conn: &mut ChatConnection<T>, nickname: &str) -> Result<Account, McError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let greeting = read_line(conn).await?;
    tracing::debug!("{}", greeting);

    // An empty token switches the server into registration mode
    write_frame(conn, Outgoing::Line(String::new())).await?;

    let prompt = read_line(conn).await?;
    tracing::debug!("{}", prompt);

    let nickname = nickname.replace(|c: char| c == '\r' || c == '\n', " ");
    write_frame(conn, Outgoing::Line(nickname.clone())).await?;
    tracing::debug!("{} (sent)", nickname);

    let response = read_line(conn).await?;
    tracing::debug!("{}", response);

    let reply = decode_json_or_null(&response)
        .map(|object| AuthReply::from_object(&object))
        .ok_or_else(|| ProtocolError::UnexpectedReply(response.clone()))?;

    let account_hash = reply
        .account_hash
        .ok_or_else(|| ProtocolError::UnexpectedReply(response.clone()))?;

    Ok(Account {
        nickname: reply.nickname.unwrap_or(nickname),
        account_hash,
    })
}
