//! Room sessions: identifiers and the per-room symmetric key.
//!
//! A room is a collaboration session scoped by a shared id and a symmetric
//! key distributed out-of-band. The key never changes for the room's
//! lifetime and is never transmitted; it is zeroized on drop.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

/// Identifier of a collaboration room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-room symmetric secret (256-bit).
///
/// Distributed out-of-band when the room is created; never stored remotely
/// and never logged. Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomKey([u8; 32]);

impl RoomKey {
    pub const LEN: usize = 32;

    /// Generate a fresh key from the OS RNG (room creation flow).
    pub fn random() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for RoomKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// Key material stays out of logs.
impl std::fmt::Debug for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RoomKey(..)")
    }
}

/// Identity of a live connection to the real-time channel.
///
/// The transport itself is outside this crate; only its identity crosses the
/// boundary, as the key of the version cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A client's view of its current collaboration room.
///
/// All three parts are optional: a session without a room (or whose
/// connection dropped) has nothing to reconcile against and save treats it
/// as a no-op.
#[derive(Debug, Clone, Default)]
pub struct RoomSession {
    pub room_id: Option<RoomId>,
    pub room_key: Option<RoomKey>,
    pub connection: Option<ConnectionId>,
}

/// Borrowed projection of a fully populated session.
pub struct ActiveRoom<'a> {
    pub room_id: &'a RoomId,
    pub room_key: &'a RoomKey,
    pub connection: ConnectionId,
}

impl RoomSession {
    pub fn new(room_id: RoomId, room_key: RoomKey, connection: ConnectionId) -> Self {
        Self {
            room_id: Some(room_id),
            room_key: Some(room_key),
            connection: Some(connection),
        }
    }

    /// All of room id, key, and connection present.
    pub fn active(&self) -> Option<ActiveRoom<'_>> {
        Some(ActiveRoom {
            room_id: self.room_id.as_ref()?,
            room_key: self.room_key.as_ref()?,
            connection: self.connection?,
        })
    }
}
