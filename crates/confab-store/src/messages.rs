//! Per-room message documents
//!
//! One JSON document per room, created on first write and extended by
//! append. The `message` field of every stored record is ciphertext; the
//! store never sees cleartext. Writes go through a temporary file and an
//! atomic rename, so readers always observe a complete document.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::Result;

/// A single persisted room message (ciphertext body)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomMessage {
    /// Sending user
    pub user_id: String,
    /// Encrypted message token
    pub message: String,
    /// Store-assigned UTC send time
    pub timestamp: DateTime<Utc>,
}

/// The on-disk document: one per room
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoomDocument {
    room_id: String,
    messages: Vec<RoomMessage>,
}

/// Append-only document store keyed by room id
///
/// Concurrent appends to the same room serialize on a per-room async lock.
/// The lock is held only across the read-modify-write of the document file,
/// never across a send to a client.
pub struct MessageStore {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MessageStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: DashMap::new(),
        })
    }

    /// Append a message to a room, creating the document on first write
    ///
    /// The timestamp is assigned here at server-clock UTC now.
    pub async fn insert_message(
        &self,
        room_id: &str,
        user_id: &str,
        ciphertext: &str,
    ) -> Result<()> {
        let path = self.document_path(room_id)?;
        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        let mut doc = load_document(&path, room_id).await?;
        doc.messages.push(RoomMessage {
            user_id: user_id.to_string(),
            message: ciphertext.to_string(),
            timestamp: Utc::now(),
        });
        save_document(&path, &doc).await?;
        tracing::debug!(room = room_id, "message appended");
        Ok(())
    }

    /// All messages in a room, ascending by timestamp
    ///
    /// Ties on timestamp keep insertion order (stable sort). A room with no
    /// document yields an empty list.
    pub async fn get_messages(&self, room_id: &str) -> Result<Vec<RoomMessage>> {
        let path = self.document_path(room_id)?;
        let mut doc = load_document(&path, room_id).await?;
        doc.messages.sort_by_key(|m| m.timestamp);
        Ok(doc.messages)
    }

    fn document_path(&self, room_id: &str) -> Result<PathBuf> {
        validate_room_id(room_id)?;
        Ok(self.root.join(format!("{}.json", room_id)))
    }

    fn room_lock(&self, room_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(room_id.to_string())
            .or_default()
            .clone()
    }
}

/// Room ids come from URLs; only identifier characters may reach the
/// filesystem.
fn validate_room_id(room_id: &str) -> Result<()> {
    let valid = !room_id.is_empty()
        && room_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidRoomId(room_id.to_string()))
    }
}

async fn load_document(path: &Path, room_id: &str) -> Result<RoomDocument> {
    match tokio::fs::read_to_string(path).await {
        Ok(data) => serde_json::from_str(&data)
            .map_err(|e| StoreError::Serialization(format!("room {}: {}", room_id, e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RoomDocument {
            room_id: room_id.to_string(),
            messages: Vec::new(),
        }),
        Err(e) => Err(e.into()),
    }
}

async fn save_document(path: &Path, doc: &RoomDocument) -> Result<()> {
    let data = serde_json::to_string_pretty(doc)
        .map_err(|e| StoreError::Serialization(format!("room {}: {}", doc.room_id, e)))?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &data).await?;

    // Restrict file permissions to owner-only on Unix (0o600)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = tokio::fs::set_permissions(&tmp, perms).await;
    }

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, MessageStore) {
        let dir = TempDir::new().unwrap();
        let store = MessageStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_missing_room_returns_empty() {
        let (_dir, store) = store();
        assert!(store.get_messages("no-such-room").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_insert_creates_document() {
        let (dir, store) = store();
        store.insert_message("r1", "alice", "token-1").await.unwrap();

        assert!(dir.path().join("r1.json").exists());
        let messages = store.get_messages("r1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].user_id, "alice");
        assert_eq!(messages[0].message, "token-1");
    }

    #[tokio::test]
    async fn test_appends_preserve_order() {
        let (_dir, store) = store();
        for i in 0..5 {
            store
                .insert_message("r1", "alice", &format!("token-{}", i))
                .await
                .unwrap();
        }

        let messages = store.get_messages("r1").await.unwrap();
        let bodies: Vec<_> = messages.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(bodies, ["token-0", "token-1", "token-2", "token-3", "token-4"]);
        assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let (_dir, store) = store();
        store.insert_message("r1", "alice", "one").await.unwrap();
        store.insert_message("r2", "bob", "two").await.unwrap();

        assert_eq!(store.get_messages("r1").await.unwrap().len(), 1);
        assert_eq!(store.get_messages("r2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_all_land() {
        let (_dir, store) = store();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .insert_message("busy", "user", &format!("token-{}", i))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.get_messages("busy").await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, store) = store();
        let result = store.insert_message("../escape", "mallory", "x").await;
        assert!(matches!(result, Err(StoreError::InvalidRoomId(_))));

        let result = store.get_messages("").await;
        assert!(matches!(result, Err(StoreError::InvalidRoomId(_))));
    }

    #[tokio::test]
    async fn test_uuid_room_ids_accepted() {
        let (_dir, store) = store();
        store
            .insert_message("550e8400-e29b-41d4-a716-446655440000", "alice", "x")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ciphertext_at_rest() {
        use confab_crypto::MessageCipher;

        let (dir, store) = store();
        let cipher = MessageCipher::new([9u8; 32]);

        let token = cipher.seal("secret").unwrap();
        store.insert_message("r3", "alice", &token).await.unwrap();

        // The raw document must not leak the cleartext
        let raw = std::fs::read_to_string(dir.path().join("r3.json")).unwrap();
        assert!(!raw.contains("secret"));

        // But the stored token still decrypts back to it
        let messages = store.get_messages("r3").await.unwrap();
        assert_eq!(cipher.open(&messages[0].message).unwrap(), "secret");
    }
}
