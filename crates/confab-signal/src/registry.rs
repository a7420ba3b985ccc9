//! Room registry
//!
//! Maps `room -> user -> live connections`. The per-room entry lock
//! serializes structural changes for that room, and enumeration returns
//! snapshot copies so no send ever runs under the lock. A user may hold
//! several connections in the same room (one per tab); each has its own
//! write path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Process-unique connection identifier
pub type ConnId = u64;

/// Per-connection outbound queue depth
const SEND_QUEUE_CAPACITY: usize = 256;

/// Handle to one live connection's write path
///
/// Frames are queued as serialized JSON text; a writer task owned by the
/// connection lifecycle drains the queue into the socket.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    /// Registry-assigned id, used to remove exactly this connection
    pub id: ConnId,
    /// Sender half of the outbound queue
    pub tx: mpsc::Sender<String>,
}

/// In-memory connection graph for all rooms
#[derive(Debug, Default)]
pub struct Registry {
    rooms: DashMap<String, HashMap<String, Vec<ConnHandle>>>,
    next_conn_id: AtomicU64,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a connection handle and the receiver its writer task drains
    pub fn new_handle(&self) -> (ConnHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        (ConnHandle { id, tx }, rx)
    }

    /// Insert a connection at `[room][user]`, creating entries as needed
    pub fn register(&self, room: &str, user: &str, conn: ConnHandle) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .entry(user.to_string())
            .or_default()
            .push(conn);
    }

    /// Remove one specific connection
    ///
    /// Empty user lists and empty rooms are pruned, so a user is present
    /// only while at least one of their connections is live.
    pub fn unregister(&self, room: &str, user: &str, conn_id: ConnId) {
        let room_now_empty = match self.rooms.get_mut(room) {
            Some(mut users) => {
                if let Some(conns) = users.get_mut(user) {
                    conns.retain(|c| c.id != conn_id);
                    if conns.is_empty() {
                        users.remove(user);
                    }
                }
                users.is_empty()
            }
            None => false,
        };

        if room_now_empty {
            // Re-checked under the entry lock so a concurrent register wins
            self.rooms.remove_if(room, |_, users| users.is_empty());
        }
    }

    /// Snapshot of every live connection in a room
    pub fn targets_in(&self, room: &str) -> Vec<(String, ConnHandle)> {
        self.rooms
            .get(room)
            .map(|users| {
                users
                    .iter()
                    .flat_map(|(user, conns)| {
                        conns.iter().map(move |c| (user.clone(), c.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of one user's live connections in a room
    pub fn targets_for(&self, room: &str, user: &str) -> Vec<ConnHandle> {
        self.rooms
            .get(room)
            .and_then(|users| users.get(user).cloned())
            .unwrap_or_default()
    }

    /// Number of live connections in a room
    pub fn connection_count(&self, room: &str) -> usize {
        self.rooms
            .get(room)
            .map(|users| users.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Whether a user currently holds any connection in a room
    pub fn contains_user(&self, room: &str, user: &str) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|users| users.contains_key(user))
    }

    /// Number of rooms with at least one connection
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(registry: &Registry) -> ConnHandle {
        let (conn, _rx) = registry.new_handle();
        conn
    }

    #[test]
    fn test_register_and_enumerate() {
        let registry = Registry::new();
        let a = handle(&registry);
        let b = handle(&registry);
        registry.register("r1", "alice", a.clone());
        registry.register("r1", "bob", b.clone());

        let mut users: Vec<_> = registry
            .targets_in("r1")
            .into_iter()
            .map(|(user, _)| user)
            .collect();
        users.sort();
        assert_eq!(users, ["alice", "bob"]);
        assert_eq!(registry.connection_count("r1"), 2);
    }

    #[test]
    fn test_multiple_tabs_preserved() {
        let registry = Registry::new();
        let tab1 = handle(&registry);
        let tab2 = handle(&registry);
        registry.register("r1", "alice", tab1.clone());
        registry.register("r1", "alice", tab2.clone());

        let conns = registry.targets_for("r1", "alice");
        assert_eq!(conns.len(), 2);
        assert_ne!(conns[0].id, conns[1].id);
    }

    #[test]
    fn test_unregister_removes_only_that_connection() {
        let registry = Registry::new();
        let tab1 = handle(&registry);
        let tab2 = handle(&registry);
        registry.register("r1", "alice", tab1.clone());
        registry.register("r1", "alice", tab2.clone());

        registry.unregister("r1", "alice", tab1.id);
        let conns = registry.targets_for("r1", "alice");
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].id, tab2.id);
        assert!(registry.contains_user("r1", "alice"));
    }

    #[test]
    fn test_last_connection_prunes_user_and_room() {
        let registry = Registry::new();
        let a = handle(&registry);
        registry.register("r1", "alice", a.clone());
        assert_eq!(registry.room_count(), 1);

        registry.unregister("r1", "alice", a.id);
        assert!(!registry.contains_user("r1", "alice"));
        assert_eq!(registry.room_count(), 0);
        assert!(registry.targets_in("r1").is_empty());
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = Registry::new();
        registry.unregister("ghost", "nobody", 42);
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_rooms_are_independent() {
        let registry = Registry::new();
        let a = handle(&registry);
        let b = handle(&registry);
        registry.register("r1", "alice", a);
        registry.register("r2", "alice", b);

        assert_eq!(registry.connection_count("r1"), 1);
        assert_eq!(registry.connection_count("r2"), 1);
        assert!(registry.targets_for("r1", "bob").is_empty());
    }

    #[test]
    fn test_handle_ids_are_unique() {
        let registry = Registry::new();
        let ids: Vec<_> = (0..100).map(|_| handle(&registry).id).collect();
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }
}
