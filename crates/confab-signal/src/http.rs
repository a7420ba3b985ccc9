//! HTTP/WebSocket boundary
//!
//! URL dispatch for the signaling endpoint plus minimal control routes.
//! CORS is permissive: the boundary performs no authentication, and room
//! and user identifiers from the URL are trusted as-is.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::AuthError;
use crate::connection::serve_connection;
use crate::SignalState;

/// Maximum inbound frame size (64 KiB); signaling payloads are small
const MAX_WS_MESSAGE_SIZE: usize = 64 * 1024;

/// Build the service router
///
/// Routes:
/// - `GET /` - health string
/// - `GET /room/?room_id&user_id` - diagnostic echo
/// - `GET /validate/{email}` - auth service probe
/// - `GET /ws/{room_id}/{user_id}` - the signaling endpoint
pub fn signal_router(state: Arc<SignalState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health_handler))
        .route("/room/", get(room_handler))
        .route("/validate/{email}", get(validate_handler))
        .route("/ws/{room_id}/{user_id}", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "confab signaling server"
}

#[derive(Debug, Deserialize)]
struct RoomQuery {
    room_id: String,
    user_id: String,
}

/// Echo the identifiers back with the room's live connection count
async fn room_handler(
    State(state): State<Arc<SignalState>>,
    Query(query): Query<RoomQuery>,
) -> Json<serde_json::Value> {
    Json(json!({
        "room_id": query.room_id,
        "user_id": query.user_id,
        "connections": state.registry.connection_count(&query.room_id),
    }))
}

/// Probe the auth service, mapping its outcomes to HTTP statuses
async fn validate_handler(
    State(state): State<Arc<SignalState>>,
    Path(email): Path<String>,
) -> Response {
    match state.auth.validate_user(&email).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "is_valid": true }))).into_response(),
        Err(AuthError::UserNotFound) => {
            (StatusCode::NOT_FOUND, "user not found").into_response()
        }
        Err(AuthError::Unavailable(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "authentication service unavailable",
        )
            .into_response(),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((room_id, user_id)): Path<(String, String)>,
    State(state): State<Arc<SignalState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| serve_connection(state, room_id, user_id, socket))
}
