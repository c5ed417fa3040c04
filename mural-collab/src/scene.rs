//! Scene model: elements, syncable snapshots, and the scene version fold.
//!
//! A scene is an ordered sequence of drawable elements; ordering is z-order
//! and semantically meaningful. Only a [`SyncableScene`] — a snapshot with
//! every transient element filtered out — is ever persisted remotely.
//!
//! [`SceneVersion`] is a cheap equality proxy for "this exact content is
//! durably saved": a deterministic fold over each element's id and version.

use serde::{Deserialize, Serialize};

/// Stable identifier of a scene element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single drawable element.
///
/// Immutable until superseded: an edit replaces the element with a copy
/// carrying a higher `version`. `version_nonce` breaks ties between equal
/// versions produced by different clients. The drawable payload itself
/// (geometry, style) is opaque to the sync core and carried as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneElement {
    pub id: ElementId,
    /// Monotonically non-decreasing per-element edit counter.
    pub version: u64,
    /// Tie-breaker between equal versions from different clients.
    pub version_nonce: u64,
    /// Tombstone flag; deleted elements are not eligible for storage.
    #[serde(default)]
    pub deleted: bool,
    /// Drawable payload, opaque to this crate.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SceneElement {
    pub fn new(id: impl Into<ElementId>, version: u64, version_nonce: u64) -> Self {
        Self {
            id: id.into(),
            version,
            version_nonce,
            deleted: false,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Whether this element may be persisted remotely.
    pub fn is_syncable(&self) -> bool {
        !self.deleted
    }
}

/// Integer fingerprint of a syncable scene's element identities/versions.
///
/// FNV-1a over `(id, version)` per element, in z-order. Deterministic across
/// processes (stored inside the remote document), order-sensitive (a reorder
/// is a content change).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneVersion(pub u64);

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

impl SceneVersion {
    /// Fold a version fingerprint over the given elements.
    pub fn of(elements: &[SceneElement]) -> Self {
        let mut hash = FNV_OFFSET;
        let mut step = |byte: u8| {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        };
        for element in elements {
            for byte in element.id.as_str().as_bytes() {
                step(*byte);
            }
            step(0);
            for byte in element.version.to_le_bytes() {
                step(byte);
            }
        }
        Self(hash)
    }
}

impl std::fmt::Display for SceneVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Convenience wrapper matching the version fold callers use for their own
/// dirty checks.
pub fn scene_version(elements: &[SceneElement]) -> SceneVersion {
    SceneVersion::of(elements)
}

/// A scene snapshot guaranteed free of transient elements.
///
/// The only form persisted remotely. The constructor filters anything not
/// eligible for storage, so every contained element is storable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncableScene {
    elements: Vec<SceneElement>,
}

impl SyncableScene {
    /// Build a syncable snapshot, dropping elements mid-deletion.
    pub fn from_elements<I>(elements: I) -> Self
    where
        I: IntoIterator<Item = SceneElement>,
    {
        Self {
            elements: elements.into_iter().filter(SceneElement::is_syncable).collect(),
        }
    }

    pub fn elements(&self) -> &[SceneElement] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<SceneElement> {
        self.elements
    }

    pub fn version(&self) -> SceneVersion {
        SceneVersion::of(&self.elements)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
