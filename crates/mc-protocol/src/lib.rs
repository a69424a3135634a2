//! mc-protocol: Wire protocol for the minechat client
//!
//! The chat server speaks a plain line protocol on two TCP ports: one
//! broadcasts every chat line, the other accepts authenticated submissions
//! terminated by an empty line. This crate holds the framing rules and a
//! tokio codec for both directions; it performs no I/O of its own.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{ChatCodec, Outgoing};
pub use error::ProtocolError;
pub use frame::{decode_line, encode_line, encode_submission, MAX_LINE_LENGTH};
pub use message::{decode_json_or_null, Account, AuthReply, JsonObject, UNKNOWN_NICKNAME};
