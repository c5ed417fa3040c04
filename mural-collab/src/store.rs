//! Remote scene document store adapter.
//!
//! One document per room, keyed by room id, replaced in place on every
//! successful save. The store exposes three row operations:
//!
//! - `fetch`  — select by key; zero rows is a valid absent state
//! - `insert` — create; duplicate key surfaces a conflict
//! - `update` — unconditional overwrite; last-writer-wins at the storage
//!   layer (the reconciliation step above is what prevents data loss)
//!
//! The store enforces no version check of its own, and `fetch`-then-`insert`
//! is not atomic across processes: a racing creator loses with
//! [`AdapterError::Conflict`] and retries as a fresh save.
//!
//! [`RestSceneStore`] speaks a PostgREST-style row API; the [`SceneStore`]
//! trait is the seam for test doubles.

use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::session::RoomId;

/// The remote-persisted unit: an encrypted scene plus its version fingerprint.
///
/// Remote documents are untrusted input; deserialization happens defensively
/// at this boundary and malformed rows surface as
/// [`AdapterError::MalformedDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSceneDocument {
    pub scene_version: u64,
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
}

/// Store round-trip errors.
#[derive(Debug, Clone)]
pub enum AdapterError {
    /// Transport-level failure (connection, DNS, body read)
    Request(String),
    /// Store answered with a non-success status
    Status { code: u16, body: String },
    /// Insert hit an existing document for this room
    Conflict(RoomId),
    /// Row exists but its document payload doesn't deserialize
    MalformedDocument(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::Request(e) => write!(f, "Store request failed: {e}"),
            AdapterError::Status { code, body } => {
                write!(f, "Store answered {code}: {body}")
            }
            AdapterError::Conflict(room) => {
                write!(f, "Document already exists for room {room}")
            }
            AdapterError::MalformedDocument(e) => write!(f, "Malformed scene document: {e}"),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Keyed document storage for scene documents.
pub trait SceneStore: Send + Sync {
    /// Single round trip. `Ok(None)` is "no document yet" — distinct from a
    /// failed lookup, which is an error.
    fn fetch(
        &self,
        room: &RoomId,
    ) -> impl std::future::Future<Output = Result<Option<StoredSceneDocument>, AdapterError>> + Send;

    /// Create the room's document. Fails with [`AdapterError::Conflict`]
    /// when one already exists.
    fn insert(
        &self,
        room: &RoomId,
        document: &StoredSceneDocument,
    ) -> impl std::future::Future<Output = Result<(), AdapterError>> + Send;

    /// Overwrite the room's document unconditionally.
    fn update(
        &self,
        room: &RoomId,
        document: &StoredSceneDocument,
    ) -> impl std::future::Future<Output = Result<(), AdapterError>> + Send;
}

#[derive(Deserialize)]
struct SceneRow {
    document: serde_json::Value,
}

/// HTTP row-store client (PostgREST-style API).
#[derive(Debug, Clone)]
pub struct RestSceneStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl RestSceneStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            table: config.scene_table.clone(),
        }
    }

    fn rows_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

impl SceneStore for RestSceneStore {
    async fn fetch(&self, room: &RoomId) -> Result<Option<StoredSceneDocument>, AdapterError> {
        let response = self
            .authed(self.client.get(self.rows_url()))
            .query(&[
                ("room_id", format!("eq.{room}")),
                ("select", "document".to_owned()),
            ])
            .send()
            .await
            .map_err(|e| AdapterError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status {
                code: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let rows: Vec<SceneRow> = response
            .json()
            .await
            .map_err(|e| AdapterError::Request(e.to_string()))?;

        match rows.into_iter().next() {
            None => Ok(None),
            Some(row) => serde_json::from_value(row.document)
                .map(Some)
                .map_err(|e| AdapterError::MalformedDocument(e.to_string())),
        }
    }

    async fn insert(
        &self,
        room: &RoomId,
        document: &StoredSceneDocument,
    ) -> Result<(), AdapterError> {
        let body = serde_json::json!({
            "room_id": room,
            "document": document,
        });

        let response = self
            .authed(self.client.post(self.rows_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Err(AdapterError::Conflict(room.clone()));
        }
        if !status.is_success() {
            return Err(AdapterError::Status {
                code: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn update(
        &self,
        room: &RoomId,
        document: &StoredSceneDocument,
    ) -> Result<(), AdapterError> {
        let body = serde_json::json!({ "document": document });

        let response = self
            .authed(self.client.patch(self.rows_url()))
            .query(&[("room_id", format!("eq.{room}"))])
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status {
                code: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}
