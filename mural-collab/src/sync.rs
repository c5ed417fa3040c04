//! Scene sync coordinator: the save and load paths against the remote store.
//!
//! Save state machine:
//! ```text
//! guard (no room / already saved) ──► NotSaved
//!        │
//!        ▼
//!      fetch ──► absent  ──► encrypt local ──► insert ──► cache = local
//!        │
//!        └────► present ──► decrypt remote ──► reconcile ──► encrypt merged
//!                                                  │
//!                                                  ▼
//!                                               update ──► cache = merged
//! ```
//!
//! Every remote write is awaited; the version cache is only touched after
//! the store confirms the write, so a failed save retries truthfully on the
//! next trigger. Saves for one room are serialized by the caller's debounce;
//! this core adds no locking of its own. A `fetch`/`insert` race between
//! processes surfaces as [`AdapterError::Conflict`] — callers retry as a
//! fresh save.
//!
//! The merge itself and post-load normalization are external collaborators
//! ([`Reconciler`], [`SceneRestorer`]).

use std::sync::Arc;

use crate::codec::{self, CodecError};
use crate::scene::{ElementId, SceneElement, SyncableScene};
use crate::session::{ConnectionId, RoomId, RoomKey, RoomSession};
use crate::store::{AdapterError, SceneStore, StoredSceneDocument};
use crate::version_cache::VersionCache;

/// The slice of editor state the merge is allowed to consult.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Element currently being edited locally, if any.
    pub editing: Option<ElementId>,
    /// Locally selected elements.
    pub selection: Vec<ElementId>,
}

/// Merges two divergent element sets into one consistent scene.
///
/// Deterministic for the same three inputs; the coordinator re-filters the
/// output to syncable form before persisting it.
pub trait Reconciler: Send + Sync {
    fn reconcile(
        &self,
        local: &[SceneElement],
        remote: &[SceneElement],
        app_state: &AppState,
    ) -> Vec<SceneElement>;
}

/// Normalizes/validates elements after decryption (schema defaults,
/// denormalized representations).
pub trait SceneRestorer: Send + Sync {
    fn restore(
        &self,
        elements: Vec<SceneElement>,
        local_state: Option<&AppState>,
    ) -> Vec<SceneElement>;
}

/// Save/load errors.
#[derive(Debug, Clone)]
pub enum SyncError {
    /// Store round trip failed
    Adapter(AdapterError),
    /// Encryption/decryption/serialization failed
    Codec(CodecError),
    /// Load found no document — indistinguishable from "room never saved",
    /// so no empty scene is synthesized
    SceneMissing(RoomId),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Adapter(e) => write!(f, "Store error: {e}"),
            SyncError::Codec(e) => write!(f, "Codec error: {e}"),
            SyncError::SceneMissing(room) => {
                write!(f, "No scene document for room {room}")
            }
        }
    }
}

impl std::error::Error for SyncError {}

impl From<AdapterError> for SyncError {
    fn from(e: AdapterError) -> Self {
        SyncError::Adapter(e)
    }
}

impl From<CodecError> for SyncError {
    fn from(e: CodecError) -> Self {
        SyncError::Codec(e)
    }
}

/// Result of a save attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Guard tripped: no active room, or this content is already stored.
    NotSaved,
    /// The store now holds this client's content. `reconciled` is the
    /// merged scene when a remote copy existed, `None` on fresh insert
    /// (nothing to merge against).
    Saved { reconciled: Option<SyncableScene> },
}

/// Orchestrates remote persistence for collaborative scenes.
pub struct SceneSync<S> {
    store: S,
    reconciler: Arc<dyn Reconciler>,
    restorer: Arc<dyn SceneRestorer>,
    cache: VersionCache,
}

impl<S: SceneStore> SceneSync<S> {
    pub fn new(store: S, reconciler: Arc<dyn Reconciler>, restorer: Arc<dyn SceneRestorer>) -> Self {
        Self {
            store,
            reconciler,
            restorer,
            cache: VersionCache::new(),
        }
    }

    /// Whether this session's scene is already durably stored.
    pub async fn is_saved(&self, session: &RoomSession, elements: &[SceneElement]) -> bool {
        let scene = SyncableScene::from_elements(elements.iter().cloned());
        self.cache.is_saved(session, &scene).await
    }

    /// Run the save state machine.
    ///
    /// On success the version cache matches what the store now holds; on
    /// failure nothing is committed to the cache.
    pub async fn save(
        &self,
        session: &RoomSession,
        elements: &[SceneElement],
        app_state: &AppState,
    ) -> Result<SaveOutcome, SyncError> {
        let Some(active) = session.active() else {
            return Ok(SaveOutcome::NotSaved);
        };
        let local = SyncableScene::from_elements(elements.iter().cloned());
        if self.cache.get(active.connection).await == Some(local.version()) {
            return Ok(SaveOutcome::NotSaved);
        }

        match self.store.fetch(active.room_id).await? {
            None => {
                let document = build_document(active.room_key, &local)?;
                self.store.insert(active.room_id, &document).await?;
                log::debug!("created scene document for room {}", active.room_id);

                // Nothing was merged, so the local elements are exactly what
                // the store now holds.
                self.cache.set(active.connection, &local).await;
                Ok(SaveOutcome::Saved { reconciled: None })
            }
            Some(remote) => {
                let previous = SyncableScene::from_elements(codec::decrypt_scene(
                    &remote.iv,
                    &remote.ciphertext,
                    active.room_key,
                )?);

                let merged = SyncableScene::from_elements(self.reconciler.reconcile(
                    local.elements(),
                    previous.elements(),
                    app_state,
                ));

                let document = build_document(active.room_key, &merged)?;
                self.store.update(active.room_id, &document).await?;
                log::debug!("updated scene document for room {}", active.room_id);

                self.cache.set(active.connection, &merged).await;
                Ok(SaveOutcome::Saved { reconciled: Some(merged) })
            }
        }
    }

    /// Run the load state machine: fetch, decrypt, cache, restore.
    ///
    /// A room with no document is an error for the caller — there is
    /// nothing to load, and an empty scene would silently shadow that.
    pub async fn load(
        &self,
        room_id: &RoomId,
        room_key: &RoomKey,
        connection: Option<ConnectionId>,
    ) -> Result<Vec<SceneElement>, SyncError> {
        let document = self
            .store
            .fetch(room_id)
            .await?
            .ok_or_else(|| SyncError::SceneMissing(room_id.clone()))?;

        let loaded = SyncableScene::from_elements(codec::decrypt_scene(
            &document.iv,
            &document.ciphertext,
            room_key,
        )?);

        // Cache before restoration: a save triggered right after load must
        // compare against what the store holds, not the normalized form.
        if let Some(connection) = connection {
            self.cache.set(connection, &loaded).await;
        }

        Ok(self.restorer.restore(loaded.into_elements(), None))
    }

    /// Evict cached state for a closed connection.
    pub async fn connection_closed(&self, connection: ConnectionId) {
        if self.cache.forget(connection).await {
            log::debug!("dropped saved-version entry for closed connection {connection}");
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

fn build_document(key: &RoomKey, scene: &SyncableScene) -> Result<StoredSceneDocument, CodecError> {
    let sealed = codec::encrypt_scene(key, scene)?;
    Ok(StoredSceneDocument {
        scene_version: scene.version().0,
        ciphertext: sealed.ciphertext,
        iv: sealed.iv.to_vec(),
    })
}
