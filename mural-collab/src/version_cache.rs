//! Last-durably-saved scene version, memoized per connection.
//!
//! Short-circuits redundant remote writes: a save whose scene version equals
//! the cached entry for its connection is a no-op. Entries are overwritten
//! on every successful save or load and must be evicted explicitly when the
//! connection closes; nothing else removes them.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::scene::{SceneVersion, SyncableScene};
use crate::session::{ConnectionId, RoomSession};

/// Process-wide `connection -> last saved scene version` map.
#[derive(Debug, Default)]
pub struct VersionCache {
    inner: RwLock<HashMap<ConnectionId, SceneVersion>>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, connection: ConnectionId) -> Option<SceneVersion> {
        self.inner.read().await.get(&connection).copied()
    }

    /// Record `scene` as the last version durably stored for `connection`.
    pub async fn set(&self, connection: ConnectionId, scene: &SyncableScene) {
        self.inner.write().await.insert(connection, scene.version());
    }

    /// Evict the entry for a closed connection. Returns whether one existed.
    pub async fn forget(&self, connection: ConnectionId) -> bool {
        self.inner.write().await.remove(&connection).is_some()
    }

    /// Whether `scene` is already durably saved for this session.
    ///
    /// A session without a room (or without a live connection) is vacuously
    /// "saved" — there is nothing to reconcile against, so nothing to write.
    pub async fn is_saved(&self, session: &RoomSession, scene: &SyncableScene) -> bool {
        match session.active() {
            Some(active) => self.get(active.connection).await == Some(scene.version()),
            None => true,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
