//! JSON payloads exchanged during the handshake

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded JSON object
pub type JsonObject = serde_json::Map<String, Value>;

/// Display name used when the server omits the nickname field
pub const UNKNOWN_NICKNAME: &str = "<unknown>";

/// Parse a server reply as a JSON object.
///
/// The server signals a rejected token with the literal line `null`. A reply
/// that is not valid JSON, or is JSON but not an object, is treated the same
/// way: there is no usable payload and the caller cannot tell the cases apart.
pub fn decode_json_or_null(text: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Successful authentication reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthReply {
    /// Display name of the account, if the server sent one
    pub nickname: Option<String>,
    /// Token echoed back by the server
    pub account_hash: Option<String>,
}

impl AuthReply {
    /// Pick the known fields out of a decoded reply; non-string values are ignored
    pub fn from_object(object: &JsonObject) -> Self {
        let field = |name: &str| object.get(name).and_then(Value::as_str).map(str::to_string);
        Self {
            nickname: field("nickname"),
            account_hash: field("account_hash"),
        }
    }

    /// Nickname, falling back to [`UNKNOWN_NICKNAME`]
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(UNKNOWN_NICKNAME)
    }
}

/// Account issued by the server on registration.
///
/// This is also the on-disk format of the token file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Nickname the server assigned
    #[serde(default)]
    pub nickname: String,
    /// Token to present on the send port
    pub account_hash: String,
}
