//! Inbound frame classification

use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::Result;

/// WebRTC signaling frame kinds relayed between peers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Session description offer
    Offer,
    /// Session description answer
    Answer,
    /// ICE transport candidate
    IceCandidate,
}

impl SignalKind {
    /// The `type` value carried on the wire
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
        }
    }

    /// The key under which the payload travels
    pub fn payload_key(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "candidate",
        }
    }
}

/// A classified client frame
///
/// The `type` field selects the variant; a frame with no `type`, or with a
/// `type` outside the known set, is an ordinary chat message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Presence announcement after joining a room
    NewUser {
        /// Announcement text, rebroadcast verbatim
        message: String,
    },
    /// WebRTC offer directed at one peer
    Offer {
        /// Target user, if the client named one
        to: Option<String>,
        /// Session description, relayed without inspection
        payload: Value,
    },
    /// WebRTC answer directed at one peer
    Answer {
        /// Target user, if the client named one
        to: Option<String>,
        /// Session description, relayed without inspection
        payload: Value,
    },
    /// ICE candidate directed at one peer
    IceCandidate {
        /// Target user, if the client named one
        to: Option<String>,
        /// Candidate, relayed without inspection
        payload: Value,
    },
    /// Ordinary chat message
    Chat {
        /// Cleartext message body
        message: String,
    },
}

impl Inbound {
    /// Classify one frame of text
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;

        match obj.get("type").and_then(Value::as_str) {
            Some("new-user") => Ok(Self::NewUser {
                message: require_string(obj, "message")?,
            }),
            Some("offer") => Ok(Self::Offer {
                to: optional_string(obj, "to"),
                payload: require_value(obj, "offer")?,
            }),
            Some("answer") => Ok(Self::Answer {
                to: optional_string(obj, "to"),
                payload: require_value(obj, "answer")?,
            }),
            Some("ice-candidate") => Ok(Self::IceCandidate {
                to: optional_string(obj, "to"),
                payload: require_value(obj, "candidate")?,
            }),
            // Unknown `type` values fall through to chat, matching what
            // deployed clients rely on.
            _ => Ok(Self::Chat {
                message: require_string(obj, "message")?,
            }),
        }
    }
}

fn require_string(obj: &Map<String, Value>, key: &'static str) -> Result<String> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ProtocolError::InvalidField(key)),
        None => Err(ProtocolError::MissingField(key)),
    }
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn require_value(obj: &Map<String, Value>, key: &'static str) -> Result<Value> {
    obj.get(key).cloned().ok_or(ProtocolError::MissingField(key))
}
