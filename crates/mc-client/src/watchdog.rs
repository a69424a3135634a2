//! Liveness watchdog
//!
//! The auth probe, the read session and the send session all report forward
//! progress on one shared queue. A single timer over that queue covers the
//! whole generation: if nothing arrives for `max_consecutive_misses` intervals
//! in a row, the connection is considered dead even though the sockets are
//! still open (e.g. a half-open TCP connection).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mc_core::config::WatchdogConfig;
use mc_core::time::current_time_secs;
use mc_core::traits::StatusSink;
use mc_core::{LivenessEvent, SessionError, StatusUpdate};

/// Receiving end of the liveness queue
pub type LivenessReceiver = mpsc::UnboundedReceiver<LivenessEvent>;

/// Producer handle for liveness events
#[derive(Debug, Clone)]
pub struct LivenessSender(mpsc::UnboundedSender<LivenessEvent>);

impl LivenessSender {
    /// A sender whose events go nowhere, for sessions run without a watchdog
    pub fn detached() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self(tx)
    }

    /// Report forward progress
    pub fn emit(&self, event: LivenessEvent) {
        // The watchdog may already be gone during teardown
        let _ = self.0.send(event);
    }
}

/// Create a liveness queue
pub fn liveness_channel() -> (LivenessSender, LivenessReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LivenessSender(tx), rx)
}

/// Raises a connectivity failure after too many silent intervals
pub struct Watchdog {
    idle_timeout: Duration,
    max_consecutive_misses: u32,
    status: Arc<dyn StatusSink>,
}

impl Watchdog {
    /// Create a new watchdog
    pub fn new(idle_timeout: Duration, max_consecutive_misses: u32, status: Arc<dyn StatusSink>) -> Self {
        Self {
            idle_timeout,
            max_consecutive_misses,
            status,
        }
    }

    /// Create a watchdog from configuration
    pub fn from_config(config: &WatchdogConfig, status: Arc<dyn StatusSink>) -> Self {
        Self::new(config.idle_timeout, config.max_consecutive_misses, status)
    }

    /// Watch the liveness queue until cancelled or timed out.
    ///
    /// Returns `Cancelled` on cancellation or when every producer is gone,
    /// and `Connectivity("watchdog timeout")` once the miss limit is reached.
    pub async fn run(
        self,
        mut events: LivenessReceiver,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        let mut misses: u32 = 0;

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                received = tokio::time::timeout(self.idle_timeout, events.recv()) => received,
            };

            match received {
                Ok(Some(event)) => {
                    misses = 0;
                    let update = StatusUpdate::Liveness {
                        timestamp: current_time_secs(),
                        event,
                    };
                    tracing::debug!(target: "watchdog", "{}", update);
                    self.status.publish(update);
                }
                Ok(None) => {
                    tracing::debug!(target: "watchdog", "Liveness queue closed");
                    return Err(SessionError::Cancelled);
                }
                Err(_elapsed) => {
                    misses += 1;
                    self.status.publish(StatusUpdate::Idle { misses });
                    if misses >= self.max_consecutive_misses {
                        tracing::warn!(
                            target: "watchdog",
                            "No activity for {} intervals of {:?}",
                            misses,
                            self.idle_timeout
                        );
                        return Err(SessionError::connectivity("watchdog timeout"));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn watchdog(idle: Duration, misses: u32) -> (Watchdog, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        (Watchdog::new(idle, misses, Arc::new(status_tx)), status_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_consecutive_misses() {
        let (watchdog, mut status_rx) = watchdog(Duration::from_secs(1), 3);
        let (_tx, rx) = liveness_channel();

        let started = Instant::now();
        let err = watchdog.run(rx, CancellationToken::new()).await.unwrap_err();

        assert_eq!(err, SessionError::connectivity("watchdog timeout"));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3100));
        assert_eq!(status_rx.recv().await, Some(StatusUpdate::Idle { misses: 1 }));
        assert_eq!(status_rx.recv().await, Some(StatusUpdate::Idle { misses: 2 }));
        assert_eq!(status_rx.recv().await, Some(StatusUpdate::Idle { misses: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_resets_miss_counter() {
        let (watchdog, mut status_rx) = watchdog(Duration::from_secs(1), 3);
        let (tx, rx) = liveness_channel();

        tokio::spawn(async move {
            // Two misses, then an event just before the third
            tokio::time::sleep(Duration::from_millis(2500)).await;
            tx.emit(LivenessEvent::ChatReceived);
            // Keep the sender alive so the queue stays open
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let started = Instant::now();
        let err = watchdog.run(rx, CancellationToken::new()).await.unwrap_err();
        assert!(err.is_retryable());
        // 2.5s until the event, then three full intervals
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(5500) && elapsed < Duration::from_millis(5600));

        let mut saw_liveness = false;
        while let Ok(update) = status_rx.try_recv() {
            if let StatusUpdate::Liveness { event, .. } = update {
                assert_eq!(event, LivenessEvent::ChatReceived);
                saw_liveness = true;
            }
        }
        assert!(saw_liveness);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_wins_regardless_of_counter() {
        let (watchdog, _status_rx) = watchdog(Duration::from_secs(1), 3);
        let (_tx, rx) = liveness_channel();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });

        let err = watchdog.run(rx, cancel).await.unwrap_err();
        assert_eq!(err, SessionError::Cancelled);
    }

    #[tokio::test]
    async fn test_closed_queue_is_cancellation() {
        let (watchdog, _status_rx) = watchdog(Duration::from_secs(5), 3);
        let (tx, rx) = liveness_channel();
        drop(tx);

        let err = watchdog.run(rx, CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, SessionError::Cancelled);
    }

    #[test]
    fn test_detached_sender_never_fails() {
        LivenessSender::detached().emit(LivenessEvent::MessageSent);
    }
}
