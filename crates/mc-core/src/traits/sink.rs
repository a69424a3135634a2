//! Output sinks

use tokio::sync::mpsc;

use crate::types::StatusUpdate;

/// Receives connection-state transitions and liveness observations.
///
/// Implementations must not block; the session engine never waits on them.
pub trait StatusSink: Send + Sync {
    /// Publish one observation
    fn publish(&self, update: StatusUpdate);
}

/// Receives every delivered chat line
pub trait LineSink: Send + Sync {
    /// Push one line
    fn push(&self, line: &str);
}

impl StatusSink for mpsc::UnboundedSender<StatusUpdate> {
    fn publish(&self, update: StatusUpdate) {
        // A dropped receiver means nobody is watching any more
        let _ = self.send(update);
    }
}

impl LineSink for mpsc::UnboundedSender<String> {
    fn push(&self, line: &str) {
        let _ = self.send(line.to_string());
    }
}
