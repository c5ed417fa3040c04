//! # mural-collab — Remote persistence for collaboratively edited scenes
//!
//! Durable-saves a shared canvas to a remote document store, encrypted at
//! rest with a per-room key, and reconciles divergent edits before writing
//! back. Binary attachments ride along in an object store bucket.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  debounce/join   ┌──────────────┐
//! │ Collab layer │ ───────────────► │  SceneSync   │
//! │ (external)   │                  │ (save/load)  │
//! └──────────────┘                  └──────┬───────┘
//!                                          │
//!                    ┌─────────────────────┼─────────────────────┐
//!                    ▼                     ▼                     ▼
//!             ┌─────────────┐      ┌──────────────┐      ┌─────────────┐
//!             │   Codec     │      │  SceneStore  │      │ VersionCache│
//!             │ (seal/open) │      │ (one doc per │      │ (conn → ver)│
//!             └─────────────┘      │    room)     │      └─────────────┘
//!                                  └──────────────┘
//!
//! ┌──────────────┐   fan-out/join   ┌──────────────┐
//! │  AssetSync   │ ───────────────► │  BlobStore   │
//! │ (per-item    │                  │ ({prefix}/id)│
//! │  accounting) │                  └──────────────┘
//! └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`scene`] — elements, syncable snapshots, scene version fold
//! - [`session`] — room id/key, connection identity
//! - [`codec`] — JSON + XChaCha20-Poly1305 scene sealing, LZ4 attachment archives
//! - [`version_cache`] — last-durably-saved version per connection
//! - [`store`] — scene document adapter (fetch / insert / update)
//! - [`sync`] — save/load coordinator, reconciliation seams
//! - [`assets`] — concurrent attachment batches
//! - [`config`] — store endpoint/credential from the environment
//!
//! The merge algorithm, the live transport, and scene restoration are
//! external collaborators reached through traits; this crate owns the
//! persistence protocol only.

pub mod assets;
pub mod codec;
pub mod config;
pub mod scene;
pub mod session;
pub mod store;
pub mod sync;
pub mod version_cache;

// Re-exports for convenience
pub use assets::{
    AssetIoError, AssetSync, AttachmentId, AttachmentUpload, BlobFetch, BlobStore,
    DownloadReport, HttpBlobStore, LoadedAttachment, UploadReport,
};
pub use codec::{
    decrypt_scene, encrypt_scene, pack_attachment, unpack_attachment, AttachmentMetadata,
    CodecError, EncryptedScene, MIME_BINARY,
};
pub use config::{ConfigError, StoreConfig, ENV_STORE_KEY, ENV_STORE_URL, FILE_CACHE_MAX_AGE_SECS};
pub use scene::{scene_version, ElementId, SceneElement, SceneVersion, SyncableScene};
pub use session::{ActiveRoom, ConnectionId, RoomId, RoomKey, RoomSession};
pub use store::{AdapterError, RestSceneStore, SceneStore, StoredSceneDocument};
pub use sync::{AppState, Reconciler, SaveOutcome, SceneRestorer, SceneSync, SyncError};
pub use version_cache::VersionCache;
