//! Outbound frame shapes
//!
//! Live chat and disconnect notices share one shape with no `type` field;
//! history, presence, and relayed signaling carry one. Signaling payloads
//! are relayed verbatim under the key the client sent them with.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::inbound::SignalKind;

/// Format an instant the way frames carry timestamps (ISO-8601 UTC)
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// One historical message replayed to a joining connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryFrame {
    /// Always `chat-history`
    #[serde(rename = "type")]
    pub kind: String,
    /// Original sender
    pub user_id: String,
    /// Decrypted message body
    pub message: String,
    /// Stored send time, ISO-8601 UTC
    pub timestamp: String,
}

impl HistoryFrame {
    pub fn new(user_id: &str, message: &str, at: DateTime<Utc>) -> Self {
        Self {
            kind: "chat-history".to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            timestamp: iso_timestamp(at),
        }
    }
}

/// Live chat broadcast or synthetic disconnect notice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatFrame {
    /// Sending user
    pub user_id: String,
    /// Cleartext message body
    pub message: String,
    /// Send time, ISO-8601 UTC
    pub timestamp: String,
}

impl ChatFrame {
    pub fn new(user_id: &str, message: &str, at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            message: message.to_string(),
            timestamp: iso_timestamp(at),
        }
    }

    /// The notice broadcast when a user's connection closes
    pub fn disconnect_notice(user_id: &str, at: DateTime<Utc>) -> Self {
        Self::new(
            user_id,
            &format!("User {} has disconnected.", user_id),
            at,
        )
    }
}

/// Presence notice broadcast after a `new-user` announcement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceFrame {
    /// Always `new-user`
    #[serde(rename = "type")]
    pub kind: String,
    /// Joining user
    pub user_id: String,
    /// Announcement text from the client
    pub message: String,
}

impl PresenceFrame {
    pub fn new(user_id: &str, message: &str) -> Self {
        Self {
            kind: "new-user".to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
        }
    }
}

/// A relayed signaling frame with the sender identity rewritten
///
/// The payload travels under `offer`, `answer`, or `candidate` to match the
/// inbound key, so it is kept as a flattened one-entry map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalFrame {
    /// `offer`, `answer`, or `ice-candidate`
    #[serde(rename = "type")]
    pub kind: String,
    /// The user the frame came from, set by the server
    pub user_id: String,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl SignalFrame {
    pub fn new(kind: SignalKind, sender: &str, payload: Value) -> Self {
        let mut map = Map::with_capacity(1);
        map.insert(kind.payload_key().to_string(), payload);
        Self {
            kind: kind.wire_name().to_string(),
            user_id: sender.to_string(),
            payload: map,
        }
    }
}
