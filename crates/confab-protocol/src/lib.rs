//! Confab signaling protocol
//!
//! One frame is one UTF-8 JSON text message over the socket. Inbound frames
//! are classified by their optional `type` field; anything without a known
//! `type` is an ordinary chat message. Outbound frames mirror the shapes the
//! browser client expects byte-for-byte.

#![forbid(unsafe_code)]

pub mod error;
pub mod inbound;
pub mod outbound;

pub use error::ProtocolError;
pub use inbound::{Inbound, SignalKind};
pub use outbound::{iso_timestamp, ChatFrame, HistoryFrame, PresenceFrame, SignalFrame};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
