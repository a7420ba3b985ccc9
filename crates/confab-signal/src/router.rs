//! Signaling router
//!
//! Classifies each inbound frame from a `(room, user, connection)` triple
//! and dispatches it: history replay on join, directed signaling to one
//! peer, broadcast chat to the whole room, synthetic disconnect notices.
//! Errors stay contained to the frame that caused them.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};

use confab_crypto::MessageCipher;
use confab_protocol::{ChatFrame, HistoryFrame, Inbound, PresenceFrame, SignalFrame, SignalKind};
use confab_store::MessageStore;

use crate::registry::{ConnHandle, Registry};

/// Routes decoded frames between the registry, the store, and the codec
pub struct Router {
    registry: Arc<Registry>,
    store: Arc<MessageStore>,
    cipher: Arc<MessageCipher>,
}

impl Router {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<MessageStore>,
        cipher: Arc<MessageCipher>,
    ) -> Self {
        Self {
            registry,
            store,
            cipher,
        }
    }

    /// Classify and route one frame of text from a connection
    ///
    /// Malformed frames are logged and dropped; the connection stays open
    /// and no error frame is sent back.
    pub async fn dispatch(&self, room: &str, user: &str, conn: &ConnHandle, text: &str) {
        let frame = match Inbound::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                error!(room, user, error = %e, "dropping malformed frame");
                return;
            }
        };

        match frame {
            Inbound::NewUser { message } => self.handle_new_user(room, user, conn, &message).await,
            Inbound::Offer { to, payload } => {
                self.relay(room, user, SignalKind::Offer, to, payload).await;
            }
            Inbound::Answer { to, payload } => {
                self.relay(room, user, SignalKind::Answer, to, payload).await;
            }
            Inbound::IceCandidate { to, payload } => {
                self.relay(room, user, SignalKind::IceCandidate, to, payload)
                    .await;
            }
            Inbound::Chat { message } => self.handle_chat(room, user, &message).await,
        }
    }

    /// Replay history to the joining connection, then announce the join
    async fn handle_new_user(&self, room: &str, user: &str, conn: &ConnHandle, message: &str) {
        self.replay_history(room, user, conn).await;

        let Some(payload) = encode(&PresenceFrame::new(user, message)) else {
            return;
        };
        self.broadcast(room, &payload).await;
    }

    /// Send every stored message to one connection, ascending by time
    ///
    /// Records that no longer decrypt (wrong key epoch, corruption) are
    /// skipped with a log entry rather than aborting the replay.
    async fn replay_history(&self, room: &str, user: &str, conn: &ConnHandle) {
        let records = match self.store.get_messages(room).await {
            Ok(records) => records,
            Err(e) => {
                error!(room, user, error = %e, "history replay failed: store read error");
                return;
            }
        };

        for record in records {
            let cleartext = match self.cipher.open(&record.message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(room, error = %e, "skipping undecryptable history record");
                    continue;
                }
            };

            let frame = HistoryFrame::new(&record.user_id, &cleartext, record.timestamp);
            let Some(payload) = encode(&frame) else {
                continue;
            };
            if conn.tx.send(payload).await.is_err() {
                // Joiner already gone; the lifecycle will clean up
                debug!(room, user, conn = conn.id, "history replay interrupted");
                return;
            }
        }
    }

    /// Forward a signaling frame to every connection of the target user
    async fn relay(
        &self,
        room: &str,
        sender: &str,
        kind: SignalKind,
        to: Option<String>,
        payload: serde_json::Value,
    ) {
        let Some(target) = to else {
            warn!(room, sender, kind = kind.wire_name(), "dropping signaling frame with no target");
            return;
        };

        let conns = self.registry.targets_for(room, &target);
        if conns.is_empty() {
            warn!(
                room,
                sender,
                target = %target,
                kind = kind.wire_name(),
                "dropping signaling frame for absent target"
            );
            return;
        }

        // The sender identity is rewritten server-side so a peer cannot
        // impersonate another user.
        let Some(text) = encode(&SignalFrame::new(kind, sender, payload)) else {
            return;
        };
        for conn in conns {
            self.send_or_evict(room, &target, &conn, text.clone()).await;
        }
    }

    /// Persist a chat message encrypted, then broadcast the cleartext
    async fn handle_chat(&self, room: &str, sender: &str, message: &str) {
        let token = match self.cipher.seal(message) {
            Ok(token) => token,
            Err(e) => {
                error!(room, sender, error = %e, "dropping chat frame: encryption failed");
                return;
            }
        };

        if let Err(e) = self.store.insert_message(room, sender, &token).await {
            error!(room, sender, error = %e, "dropping chat frame: store write failed");
            return;
        }

        let Some(payload) = encode(&ChatFrame::new(sender, message, Utc::now())) else {
            return;
        };
        self.broadcast(room, &payload).await;
    }

    /// Broadcast the synthetic notice after a user's connection closed
    ///
    /// The notice is not persisted; replaying disconnects as chat history
    /// would fabricate messages nobody sent.
    pub async fn emit_disconnect(&self, room: &str, user: &str) {
        let Some(payload) = encode(&ChatFrame::disconnect_notice(user, Utc::now())) else {
            return;
        };
        self.broadcast(room, &payload).await;
    }

    /// Enqueue a payload to every connection in the room, sender included
    async fn broadcast(&self, room: &str, payload: &str) {
        for (user, conn) in self.registry.targets_in(room) {
            self.send_or_evict(room, &user, &conn, payload.to_string())
                .await;
        }
    }

    /// Queue one payload; a failed send evicts that connection and moves on
    async fn send_or_evict(&self, room: &str, user: &str, conn: &ConnHandle, payload: String) {
        if conn.tx.send(payload).await.is_err() {
            debug!(room, user, conn = conn.id, "send failed, unregistering connection");
            self.registry.unregister(room, user, conn.id);
        }
    }
}

fn encode<T: Serialize>(frame: &T) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(text),
        Err(e) => {
            error!(error = %e, "failed to serialize outbound frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct Fixture {
        _dir: TempDir,
        registry: Arc<Registry>,
        store: Arc<MessageStore>,
        cipher: Arc<MessageCipher>,
        router: Router,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(Registry::new());
        let store = Arc::new(MessageStore::open(dir.path()).unwrap());
        let cipher = Arc::new(MessageCipher::new([1u8; 32]));
        let router = Router::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&cipher),
        );
        Fixture {
            _dir: dir,
            registry,
            store,
            cipher,
            router,
        }
    }

    fn join(fx: &Fixture, room: &str, user: &str) -> (ConnHandle, mpsc::Receiver<String>) {
        let (conn, rx) = fx.registry.new_handle();
        fx.registry.register(room, user, conn.clone());
        (conn, rx)
    }

    fn next_frame(rx: &mut mpsc::Receiver<String>) -> Value {
        let text = rx.try_recv().expect("expected a queued frame");
        serde_json::from_str(&text).unwrap()
    }

    fn assert_empty(rx: &mut mpsc::Receiver<String>) {
        assert!(rx.try_recv().is_err(), "expected no queued frame");
    }

    #[tokio::test]
    async fn test_chat_broadcasts_to_all_including_sender() {
        let fx = fixture();
        let (alice, mut alice_rx) = join(&fx, "r1", "alice");
        let (_bob, mut bob_rx) = join(&fx, "r1", "bob");

        fx.router
            .dispatch("r1", "alice", &alice, r#"{"message":"hello"}"#)
            .await;

        for rx in [&mut alice_rx, &mut bob_rx] {
            let frame = next_frame(rx);
            assert_eq!(frame["user_id"], "alice");
            assert_eq!(frame["message"], "hello");
            assert!(frame["timestamp"].is_string());
            assert!(frame.get("type").is_none());
        }
    }

    #[tokio::test]
    async fn test_chat_persists_ciphertext() {
        let fx = fixture();
        let (alice, _alice_rx) = join(&fx, "r1", "alice");

        fx.router
            .dispatch("r1", "alice", &alice, r#"{"message":"secret"}"#)
            .await;

        let stored = fx.store.get_messages("r1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].message, "secret");
        assert_eq!(fx.cipher.open(&stored[0].message).unwrap(), "secret");
    }

    #[tokio::test]
    async fn test_offer_reaches_only_target() {
        let fx = fixture();
        let (x, _x_rx) = join(&fx, "r2", "x");
        let (_y, mut y_rx) = join(&fx, "r2", "y");
        let (_z, mut z_rx) = join(&fx, "r2", "z");

        fx.router
            .dispatch(
                "r2",
                "x",
                &x,
                r#"{"type":"offer","to":"y","offer":{"sdp":"v=0"}}"#,
            )
            .await;

        let frame = next_frame(&mut y_rx);
        assert_eq!(frame["type"], "offer");
        assert_eq!(frame["user_id"], "x");
        assert_eq!(frame["offer"], json!({"sdp": "v=0"}));
        assert_empty(&mut z_rx);
    }

    #[tokio::test]
    async fn test_offer_reaches_all_target_tabs() {
        let fx = fixture();
        let (x, _x_rx) = join(&fx, "r2", "x");
        let (_tab1, mut tab1_rx) = join(&fx, "r2", "y");
        let (_tab2, mut tab2_rx) = join(&fx, "r2", "y");

        fx.router
            .dispatch("r2", "x", &x, r#"{"type":"offer","to":"y","offer":"sdp"}"#)
            .await;

        assert_eq!(next_frame(&mut tab1_rx)["user_id"], "x");
        assert_eq!(next_frame(&mut tab2_rx)["user_id"], "x");
    }

    #[tokio::test]
    async fn test_signaling_to_absent_target_is_dropped() {
        let fx = fixture();
        let (x, mut x_rx) = join(&fx, "r2", "x");

        fx.router
            .dispatch("r2", "x", &x, r#"{"type":"offer","to":"ghost","offer":"sdp"}"#)
            .await;
        fx.router
            .dispatch("r2", "x", &x, r#"{"type":"answer","answer":"sdp"}"#)
            .await;

        assert_empty(&mut x_rx);
    }

    #[tokio::test]
    async fn test_ice_candidate_relay_shape() {
        let fx = fixture();
        let (x, _x_rx) = join(&fx, "r2", "x");
        let (_y, mut y_rx) = join(&fx, "r2", "y");

        fx.router
            .dispatch(
                "r2",
                "x",
                &x,
                r#"{"type":"ice-candidate","to":"y","candidate":{"mid":0}}"#,
            )
            .await;

        let frame = next_frame(&mut y_rx);
        assert_eq!(frame["type"], "ice-candidate");
        assert_eq!(frame["candidate"], json!({"mid": 0}));
    }

    #[tokio::test]
    async fn test_new_user_replays_history_then_announces() {
        let fx = fixture();
        // One prior message, stored encrypted
        let token = fx.cipher.seal("earlier").unwrap();
        fx.store.insert_message("r1", "bob", &token).await.unwrap();

        let (carol, mut carol_rx) = join(&fx, "r1", "carol");
        fx.router
            .dispatch(
                "r1",
                "carol",
                &carol,
                r#"{"type":"new-user","message":"user connected"}"#,
            )
            .await;

        let history = next_frame(&mut carol_rx);
        assert_eq!(history["type"], "chat-history");
        assert_eq!(history["user_id"], "bob");
        assert_eq!(history["message"], "earlier");

        let notice = next_frame(&mut carol_rx);
        assert_eq!(notice["type"], "new-user");
        assert_eq!(notice["user_id"], "carol");
        assert_eq!(notice["message"], "user connected");
    }

    #[tokio::test]
    async fn test_history_replay_preserves_order() {
        let fx = fixture();
        for i in 0..3 {
            let token = fx.cipher.seal(&format!("m{}", i)).unwrap();
            fx.store.insert_message("r1", "bob", &token).await.unwrap();
        }

        let (carol, mut carol_rx) = join(&fx, "r1", "carol");
        fx.router
            .dispatch(
                "r1",
                "carol",
                &carol,
                r#"{"type":"new-user","message":"user connected"}"#,
            )
            .await;

        for i in 0..3 {
            let frame = next_frame(&mut carol_rx);
            assert_eq!(frame["message"], format!("m{}", i));
        }
    }

    #[tokio::test]
    async fn test_undecryptable_history_record_skipped() {
        let fx = fixture();
        let good = fx.cipher.seal("readable").unwrap();
        fx.store
            .insert_message("r1", "bob", "corrupt-token")
            .await
            .unwrap();
        fx.store.insert_message("r1", "bob", &good).await.unwrap();

        let (carol, mut carol_rx) = join(&fx, "r1", "carol");
        fx.router
            .dispatch(
                "r1",
                "carol",
                &carol,
                r#"{"type":"new-user","message":"user connected"}"#,
            )
            .await;

        let frame = next_frame(&mut carol_rx);
        assert_eq!(frame["type"], "chat-history");
        assert_eq!(frame["message"], "readable");
    }

    #[tokio::test]
    async fn test_disconnect_notice_broadcast() {
        let fx = fixture();
        let (_bob, mut bob_rx) = join(&fx, "r1", "bob");

        fx.router.emit_disconnect("r1", "alice").await;

        let frame = next_frame(&mut bob_rx);
        assert_eq!(frame["user_id"], "alice");
        assert_eq!(frame["message"], "User alice has disconnected.");
        assert!(frame["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_disconnect_notice_not_persisted() {
        let fx = fixture();
        let (_bob, _bob_rx) = join(&fx, "r1", "bob");

        fx.router.emit_disconnect("r1", "alice").await;

        assert!(fx.store.get_messages("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_evicts_connection() {
        let fx = fixture();
        let (alice, _alice_rx) = join(&fx, "r1", "alice");
        let (_dead, dead_rx) = join(&fx, "r1", "bob");
        drop(dead_rx); // writer gone, sends to bob now fail

        fx.router
            .dispatch("r1", "alice", &alice, r#"{"message":"hello"}"#)
            .await;

        assert!(!fx.registry.contains_user("r1", "bob"));
        assert!(fx.registry.contains_user("r1", "alice"));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_contained() {
        let fx = fixture();
        let (alice, mut alice_rx) = join(&fx, "r1", "alice");

        fx.router.dispatch("r1", "alice", &alice, "{not json").await;
        fx.router
            .dispatch("r1", "alice", &alice, r#"{"no_message_field":1}"#)
            .await;

        assert_empty(&mut alice_rx);
        assert!(fx.registry.contains_user("r1", "alice"));
        assert!(fx.store.get_messages("r1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_type_treated_as_chat() {
        let fx = fixture();
        let (alice, mut alice_rx) = join(&fx, "r1", "alice");

        fx.router
            .dispatch("r1", "alice", &alice, r#"{"type":"wave","message":"hi"}"#)
            .await;

        let frame = next_frame(&mut alice_rx);
        assert_eq!(frame["message"], "hi");
        assert_eq!(fx.store.get_messages("r1").await.unwrap().len(), 1);
    }
}
