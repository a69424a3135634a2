//! mc-client: Resilient minechat client
//!
//! Runs the read session, the send session, an auth probe and a liveness
//! watchdog as one unit per connection generation. Any connectivity failure
//! tears the unit down and the supervisor starts a fresh one after a delay;
//! a rejected credential stops the client.

pub mod auth;
pub mod connection;
pub mod reconnect;
pub mod session;
pub mod sinks;
pub mod supervisor;
pub mod watchdog;

pub use auth::{authenticate, register};
pub use reconnect::{ExponentialBackoff, ReconnectPolicy};
pub use session::{outbound_queue, AuthProbe, OutboundQueue, ReadSession, SendSession};
pub use supervisor::{SessionOutcome, Supervisor};
pub use watchdog::{liveness_channel, LivenessSender, Watchdog};
