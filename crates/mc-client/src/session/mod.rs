//! Per-generation session components

mod probe;
mod reader;
mod sender;

pub use probe::AuthProbe;
pub use reader::ReadSession;
pub use sender::{outbound_queue, OutboundQueue, SendSession};

use std::sync::Arc;

use mc_core::traits::StatusSink;
use mc_core::{ConnectionState, StatusUpdate};

/// Which socket a status update refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Read,
    Send,
}

/// Publishes connection state for one socket.
///
/// `Initiated` is published on creation and `Closed` when dropped, so the
/// closing transition is reported on every exit path, including aborts.
struct ConnectionStatus {
    status: Arc<dyn StatusSink>,
    channel: Channel,
}

impl ConnectionStatus {
    fn initiated(status: Arc<dyn StatusSink>, channel: Channel) -> Self {
        let this = Self { status, channel };
        this.publish(ConnectionState::Initiated);
        this
    }

    fn established(&self) {
        self.publish(ConnectionState::Established);
    }

    fn publish(&self, state: ConnectionState) {
        let update = match self.channel {
            Channel::Read => StatusUpdate::ReadConnection(state),
            Channel::Send => StatusUpdate::SendConnection(state),
        };
        self.status.publish(update);
    }
}

impl Drop for ConnectionStatus {
    fn drop(&mut self) {
        self.publish(ConnectionState::Closed);
    }
}
