//! Confab signaling server
//!
//! Operates conversational rooms over long-lived WebSockets: encrypted
//! persistent history with replay on join, WebRTC signaling relay
//! (offer/answer/ICE fan-out), and chat broadcast. One task services each
//! connection; the room registry is the only shared mutable state.

#![forbid(unsafe_code)]

pub mod auth;
pub mod connection;
pub mod http;
pub mod registry;
pub mod router;

use std::sync::Arc;

use auth::AuthClient;
use registry::Registry;
use router::Router;

/// Shared server context, constructed once at startup and passed by
/// reference into every handler.
pub struct SignalState {
    /// In-memory connection graph
    pub registry: Arc<Registry>,
    /// Frame router over the registry, store, and codec
    pub router: Arc<Router>,
    /// Probe client for the Authentication service
    pub auth: AuthClient,
}
