//! Connection lifecycle
//!
//! `Accepting -> Registered -> Pumping -> Draining -> Closed`. One task per
//! connection: a writer drains the per-connection queue into the socket
//! while this task pumps inbound frames into the router. Cleanup runs on
//! every exit path; a drop guard covers panics and task cancellation.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info};

use crate::registry::{ConnId, Registry};
use crate::SignalState;

/// Service one accepted WebSocket until it closes
pub async fn serve_connection(
    state: Arc<SignalState>,
    room_id: String,
    user_id: String,
    socket: WebSocket,
) {
    info!(room = %room_id, user = %user_id, "connection accepted");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (conn, mut outbound) = state.registry.new_handle();

    // Writer half: drain the queue into the socket until either end closes
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if ws_sink.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Registered
    state.registry.register(&room_id, &user_id, conn.clone());
    let mut guard = DrainGuard {
        registry: &state.registry,
        room_id: &room_id,
        user_id: &user_id,
        conn_id: conn.id,
        armed: true,
    };

    // Pumping: inbound frames in arrival order
    while let Some(message) = ws_stream.next().await {
        match message {
            Ok(WsMessage::Text(text)) => {
                state
                    .router
                    .dispatch(&room_id, &user_id, &conn, text.as_str())
                    .await;
            }
            Ok(WsMessage::Close(_)) | Err(_) => break,
            // Pings are answered by axum; binary frames are not part of
            // the protocol.
            Ok(_) => continue,
        }
    }

    // Draining: remove exactly this connection, then tell the remaining
    // peers. The guard is disarmed because cleanup now runs inline.
    guard.armed = false;
    state.registry.unregister(&room_id, &user_id, conn.id);
    state.router.emit_disconnect(&room_id, &user_id).await;

    // Dropping the last sender closes the queue and lets the writer wind
    // down after flushing what was already enqueued.
    drop(conn);
    let _ = writer.await;

    info!(room = %room_id, user = %user_id, "connection closed");
}

/// Unregisters the connection if the pump unwinds without draining
///
/// Drop cannot await, so the disconnect broadcast is skipped on this path;
/// the registry invariant (no dead connections enumerated) still holds.
struct DrainGuard<'a> {
    registry: &'a Registry,
    room_id: &'a str,
    user_id: &'a str,
    conn_id: ConnId,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(
                room = %self.room_id,
                user = %self.user_id,
                conn = self.conn_id,
                "pump exited abnormally, unregistering"
            );
            self.registry
                .unregister(self.room_id, self.user_id, self.conn_id);
        }
    }
}
