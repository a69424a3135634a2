//! Session supervisor
//!
//! Runs one generation at a time: the auth probe, the read session, the send
//! session and the watchdog share a cancellation token. The first real
//! failure cancels the rest, and the supervisor then decides between
//! reconnecting, stopping, or giving up.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use mc_core::config::ClientConfig;
use mc_core::traits::{CredentialStore, LineSink, StatusSink};
use mc_core::{Credential, SessionError, StatusUpdate};

use crate::reconnect::ReconnectPolicy;
use crate::session::{AuthProbe, OutboundQueue, ReadSession, SendSession};
use crate::watchdog::{liveness_channel, LivenessSender, Watchdog};

/// How a generation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Cancelled from outside or the outbound queue closed
    Shutdown,
    /// Connectivity failure; start a new generation
    Retryable(String),
    /// Credential failure; stop the client
    Fatal(SessionError),
}

impl SessionOutcome {
    fn from_error(err: SessionError) -> Self {
        match err {
            SessionError::Credential(_) => SessionOutcome::Fatal(err),
            SessionError::Connectivity(reason) => SessionOutcome::Retryable(reason),
            SessionError::Cancelled | SessionError::Shutdown => SessionOutcome::Shutdown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    AuthProbe,
    Read,
    Send,
    Watchdog,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::AuthProbe => write!(f, "auth probe"),
            Component::Read => write!(f, "read session"),
            Component::Send => write!(f, "send session"),
            Component::Watchdog => write!(f, "watchdog"),
        }
    }
}

type ComponentResult = (Component, Result<(), SessionError>);

/// Restarts session generations until shutdown or a fatal error
pub struct Supervisor {
    config: ClientConfig,
    display: Arc<dyn LineSink>,
    history: Arc<dyn LineSink>,
    status: Arc<dyn StatusSink>,
}

impl Supervisor {
    /// Create a supervisor delivering chat lines to `display` and `history`
    pub fn new(
        config: ClientConfig,
        display: Arc<dyn LineSink>,
        history: Arc<dyn LineSink>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            config,
            display,
            history,
            status,
        }
    }

    /// Run chat generations until `cancel` fires or the credential fails.
    ///
    /// The credential is loaded once; a missing token fails before any
    /// connection is opened. Returns `Ok` on shutdown.
    pub async fn run_forever(
        &self,
        credentials: &dyn CredentialStore,
        outbound: OutboundQueue,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        let credential = credentials.load().await?;
        let mut policy = ReconnectPolicy::from_config(&self.config.reconnect);
        let mut generation: u64 = 0;

        loop {
            generation += 1;
            tracing::info!("Starting session generation {}", generation);
            let started = Instant::now();

            match self.run_generation(&credential, &outbound, &cancel).await {
                SessionOutcome::Shutdown => {
                    tracing::info!("Supervisor shutting down");
                    return Ok(());
                }
                SessionOutcome::Fatal(err) => {
                    tracing::error!("Giving up: {}", err);
                    return Err(err);
                }
                SessionOutcome::Retryable(reason) => {
                    if !self.wait_before_retry(&mut policy, started, reason, &cancel).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run the read session alone, without credentials or a watchdog
    pub async fn run_listen_forever(&self, cancel: CancellationToken) -> Result<(), SessionError> {
        let mut policy = ReconnectPolicy::from_config(&self.config.listen_reconnect);

        loop {
            let started = Instant::now();
            let session = ReadSession::new(
                self.config.listen_address(),
                self.config.connect_timeout,
                Arc::clone(&self.display),
                Arc::clone(&self.history),
                Arc::clone(&self.status),
                LivenessSender::detached(),
            );

            let err = match session.run(cancel.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            match SessionOutcome::from_error(err) {
                SessionOutcome::Shutdown => return Ok(()),
                SessionOutcome::Fatal(err) => return Err(err),
                SessionOutcome::Retryable(reason) => {
                    if !self.wait_before_retry(&mut policy, started, reason, &cancel).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run one generation to completion and classify how it ended
    pub async fn run_generation(
        &self,
        credential: &Credential,
        outbound: &OutboundQueue,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        let token = cancel.child_token();
        let (liveness, events) = liveness_channel();
        let mut tasks: JoinSet<ComponentResult> = JoinSet::new();

        let probe = AuthProbe::new(
            self.config.send_address(),
            self.config.connect_timeout,
            credential.clone(),
            Arc::clone(&self.status),
            liveness.clone(),
        );
        let probe_token = token.clone();
        tasks.spawn(async move { (Component::AuthProbe, probe.run(probe_token).await) });

        let reader = ReadSession::new(
            self.config.listen_address(),
            self.config.connect_timeout,
            Arc::clone(&self.display),
            Arc::clone(&self.history),
            Arc::clone(&self.status),
            liveness.clone(),
        );
        let read_token = token.clone();
        tasks.spawn(async move { (Component::Read, reader.run(read_token).await) });

        let sender = SendSession::new(
            &self.config,
            credential.clone(),
            Arc::clone(&self.status),
            liveness,
        );
        let send_queue = Arc::clone(outbound);
        let send_token = token.clone();
        tasks.spawn(async move { (Component::Send, sender.run(send_queue, send_token).await) });

        let watchdog = Watchdog::from_config(&self.config.watchdog, Arc::clone(&self.status));
        let watchdog_token = token.clone();
        tasks.spawn(async move { (Component::Watchdog, watchdog.run(events, watchdog_token).await) });

        self.settle(&mut tasks, &token, cancel).await
    }

    /// Wait for the first real failure, then cancel and drain the generation
    async fn settle(
        &self,
        tasks: &mut JoinSet<ComponentResult>,
        token: &CancellationToken,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        let mut outcome = SessionOutcome::Shutdown;
        while let Some(joined) = tasks.join_next().await {
            let (component, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!("Session task aborted: {}", e);
                    outcome = SessionOutcome::Retryable(format!("session task aborted: {}", e));
                    break;
                }
            };

            match result {
                Ok(()) => tracing::debug!("{} finished", component),
                Err(SessionError::Cancelled) => tracing::debug!("{} cancelled", component),
                Err(err) => {
                    if err.is_fatal() {
                        tracing::error!("{} failed: {}", component, err);
                    } else {
                        tracing::warn!("{} failed: {}", component, err);
                    }
                    outcome = SessionOutcome::from_error(err);
                    break;
                }
            }
        }

        token.cancel();
        if let Some(err) = self.drain(tasks).await {
            outcome = SessionOutcome::Fatal(err);
        }

        match outcome {
            SessionOutcome::Retryable(_) if cancel.is_cancelled() => SessionOutcome::Shutdown,
            other => other,
        }
    }

    /// Give cancelled components time to close their sockets, then abort.
    ///
    /// Returns a credential failure reported while draining.
    async fn drain(&self, tasks: &mut JoinSet<ComponentResult>) -> Option<SessionError> {
        let mut fatal = None;
        let deadline = tokio::time::sleep(self.config.drain_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((component, Err(err)))) if err.is_fatal() => {
                        tracing::error!("{} failed: {}", component, err);
                        fatal = Some(err);
                    }
                    Some(_) => {}
                },
                _ = &mut deadline => {
                    tracing::warn!("{} session task(s) did not stop in time, aborting", tasks.len());
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
            }
        }
        fatal
    }

    /// Publish the delay and sleep. Returns `false` if cancelled meanwhile.
    async fn wait_before_retry(
        &self,
        policy: &mut ReconnectPolicy,
        started: Instant,
        reason: String,
        cancel: &CancellationToken,
    ) -> bool {
        let delay = policy.next_delay(started.elapsed());
        tracing::info!("Reconnecting in {:?}", delay);
        self.status.publish(StatusUpdate::Reconnecting { reason, delay });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn supervisor(drain_timeout: Duration) -> Supervisor {
        let (line_tx, _line_rx) = mpsc::unbounded_channel::<String>();
        let (status_tx, _status_rx) = mpsc::unbounded_channel::<StatusUpdate>();
        let config = ClientConfig {
            drain_timeout,
            ..ClientConfig::default()
        };
        Supervisor::new(config, Arc::new(line_tx.clone()), Arc::new(line_tx), Arc::new(status_tx))
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_failure_while_draining_is_fatal() {
        let supervisor = supervisor(Duration::from_millis(500));
        let cancel = CancellationToken::new();
        let token = cancel.child_token();
        let mut tasks: JoinSet<ComponentResult> = JoinSet::new();

        tasks.spawn(async {
            (Component::Read, Err(SessionError::connectivity("server closed read stream")))
        });
        let send_token = token.clone();
        tasks.spawn(async move {
            send_token.cancelled().await;
            (Component::Send, Err(SessionError::credential("Unknown token")))
        });

        let outcome = supervisor.settle(&mut tasks, &token, &cancel).await;

        assert_eq!(outcome, SessionOutcome::Fatal(SessionError::credential("Unknown token")));
        assert!(tasks.is_empty());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_task_ignoring_cancellation() {
        let supervisor = supervisor(Duration::from_millis(500));
        let cancel = CancellationToken::new();
        let token = cancel.child_token();
        let mut tasks: JoinSet<ComponentResult> = JoinSet::new();

        tasks.spawn(async {
            (Component::Watchdog, Err(SessionError::connectivity("watchdog timeout")))
        });
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            (Component::Send, Ok(()))
        });

        let started = Instant::now();
        let outcome = supervisor.settle(&mut tasks, &token, &cancel).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, SessionOutcome::Retryable("watchdog timeout".to_string()));
        assert!(elapsed >= Duration::from_millis(500), "drained after {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(600), "drained after {:?}", elapsed);
        assert!(tasks.is_empty());
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooperative_siblings_drain_without_waiting() {
        let supervisor = supervisor(Duration::from_millis(500));
        let cancel = CancellationToken::new();
        let token = cancel.child_token();
        let mut tasks: JoinSet<ComponentResult> = JoinSet::new();

        tasks.spawn(async {
            (Component::Read, Err(SessionError::connectivity("server closed read stream")))
        });
        for component in [Component::Send, Component::Watchdog] {
            let sibling_token = token.clone();
            tasks.spawn(async move {
                sibling_token.cancelled().await;
                (component, Err(SessionError::Cancelled))
            });
        }

        let started = Instant::now();
        let outcome = supervisor.settle(&mut tasks, &token, &cancel).await;

        assert_eq!(outcome, SessionOutcome::Retryable("server closed read stream".to_string()));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_external_cancel_is_shutdown() {
        let supervisor = supervisor(Duration::from_millis(500));
        let cancel = CancellationToken::new();
        let token = cancel.child_token();
        let mut tasks: JoinSet<ComponentResult> = JoinSet::new();

        cancel.cancel();
        tasks.spawn(async { (Component::Read, Err(SessionError::connectivity("reset by peer"))) });

        let outcome = supervisor.settle(&mut tasks, &token, &cancel).await;
        assert_eq!(outcome, SessionOutcome::Shutdown);
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(
            SessionOutcome::from_error(SessionError::connectivity("watchdog timeout")),
            SessionOutcome::Retryable("watchdog timeout".to_string())
        );
        assert_eq!(
            SessionOutcome::from_error(SessionError::Shutdown),
            SessionOutcome::Shutdown
        );
        assert_eq!(
            SessionOutcome::from_error(SessionError::Cancelled),
            SessionOutcome::Shutdown
        );
        assert!(matches!(
            SessionOutcome::from_error(SessionError::credential("Unknown token")),
            SessionOutcome::Fatal(SessionError::Credential(_))
        ));
    }

    #[test]
    fn test_component_names() {
        assert_eq!(Component::AuthProbe.to_string(), "auth probe");
        assert_eq!(Component::Watchdog.to_string(), "watchdog");
    }
}
