//! Bulk binary attachment upload/download against the object store.
//!
//! Attachments are addressed by `{prefix}/{attachment_id}` (the prefix is
//! room-derived). Batches fan out concurrently and join; each item's outcome
//! is tracked separately — one failure never aborts or blocks the others,
//! it lands in the batch's errored set instead.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::codec::{self, AttachmentMetadata, MIME_BINARY};
use crate::config::StoreConfig;
use crate::session::RoomKey;

/// Identifier of a binary attachment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(String);

impl AttachmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AttachmentId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl std::fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One attachment queued for upload. The buffer is already packed
/// ([`codec::pack_attachment`]) by the caller.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub id: AttachmentId,
    pub buffer: Vec<u8>,
}

/// An attachment fetched and unpacked from the object store.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedAttachment {
    pub id: AttachmentId,
    pub mime_type: String,
    pub payload: Vec<u8>,
    /// Milliseconds since epoch; "now" when the archive didn't record it.
    pub created: u64,
    pub last_retrieved: u64,
}

/// Per-item upload accounting. Duplicate input ids resolve independently,
/// so an id may appear in both sets when the caller passed it twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadReport {
    pub saved: Vec<AttachmentId>,
    pub errored: Vec<AttachmentId>,
}

/// Per-item download accounting over the distinct requested ids.
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub loaded: Vec<LoadedAttachment>,
    pub errored: Vec<AttachmentId>,
}

/// Per-item attachment I/O errors.
#[derive(Debug, Clone)]
pub enum AssetIoError {
    /// Transport-level failure
    Request(String),
    /// Object store answered with a failure status
    Status(u16),
    /// Blob fetched but could not be unsealed/decompressed/decoded
    Decode(String),
}

impl std::fmt::Display for AssetIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetIoError::Request(e) => write!(f, "Blob request failed: {e}"),
            AssetIoError::Status(code) => write!(f, "Blob store answered {code}"),
            AssetIoError::Decode(e) => write!(f, "Blob decode failed: {e}"),
        }
    }
}

impl std::error::Error for AssetIoError {}

/// A fetched blob: HTTP-style status plus raw body.
#[derive(Debug, Clone)]
pub struct BlobFetch {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Bucket-style blob storage.
pub trait BlobStore: Send + Sync {
    fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        mime_type: &str,
        cache_control: &str,
    ) -> impl std::future::Future<Output = Result<(), AssetIoError>> + Send;

    /// Plain authenticated GET. Failure statuses come back as a
    /// [`BlobFetch`], not an error — the batch decides per item.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<BlobFetch, AssetIoError>> + Send;
}

/// Concurrent attachment batches with per-item accounting.
pub struct AssetSync<B> {
    store: B,
    cache_max_age_secs: u64,
}

impl<B: BlobStore> AssetSync<B> {
    pub fn new(store: B, cache_max_age_secs: u64) -> Self {
        Self {
            store,
            cache_max_age_secs,
        }
    }

    /// Upload every item independently and concurrently.
    pub async fn upload(&self, prefix: &str, items: Vec<AttachmentUpload>) -> UploadReport {
        let cache_control = format!("public, max-age={}", self.cache_max_age_secs);

        let outcomes = join_all(items.into_iter().map(|item| {
            let cache_control = cache_control.as_str();
            async move {
                let key = blob_key(prefix, &item.id);
                let result = self
                    .store
                    .put(&key, item.buffer, MIME_BINARY, cache_control)
                    .await;
                if let Err(ref e) = result {
                    log::warn!("attachment upload failed for {key}: {e}");
                }
                (item.id, result.is_ok())
            }
        }))
        .await;

        let mut report = UploadReport::default();
        for (id, saved) in outcomes {
            if saved {
                report.saved.push(id);
            } else {
                report.errored.push(id);
            }
        }
        report
    }

    /// Fetch, unseal, and decompress the requested attachments.
    ///
    /// Ids are de-duplicated first: each distinct id is fetched at most
    /// once. A failure status, transport error, or decode error records the
    /// id in the errored set and never escapes the batch.
    pub async fn download(
        &self,
        prefix: &str,
        decryption_key: &RoomKey,
        ids: &[AttachmentId],
    ) -> DownloadReport {
        let mut seen = HashSet::new();
        let distinct: Vec<&AttachmentId> =
            ids.iter().filter(|id| seen.insert(*id)).collect();

        let outcomes = join_all(distinct.into_iter().map(|id| async move {
            let key = blob_key(prefix, id);
            let result = self.fetch_one(&key, decryption_key).await;
            if let Err(ref e) = result {
                log::warn!("attachment download failed for {key}: {e}");
            }
            (id.clone(), result)
        }))
        .await;

        let now = now_millis();
        let mut report = DownloadReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok((metadata, payload)) => {
                    let created = metadata.created.unwrap_or(now);
                    report.loaded.push(LoadedAttachment {
                        id,
                        mime_type: if metadata.mime_type.is_empty() {
                            MIME_BINARY.to_owned()
                        } else {
                            metadata.mime_type
                        },
                        payload,
                        created,
                        last_retrieved: created,
                    });
                }
                Err(_) => report.errored.push(id),
            }
        }
        report
    }

    async fn fetch_one(
        &self,
        key: &str,
        decryption_key: &RoomKey,
    ) -> Result<(AttachmentMetadata, Vec<u8>), AssetIoError> {
        let fetched = self.store.get(key).await?;
        if fetched.status >= 400 {
            return Err(AssetIoError::Status(fetched.status));
        }
        codec::unpack_attachment(&fetched.body, Some(decryption_key))
            .map_err(|e| AssetIoError::Decode(e.to_string()))
    }

    pub fn store(&self) -> &B {
        &self.store
    }
}

fn blob_key(prefix: &str, id: &AttachmentId) -> String {
    format!("{prefix}/{id}")
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// HTTP object-store client (bucket blob API).
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    api_key: String,
}

impl HttpBlobStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            bucket: config.asset_bucket.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }
}

impl BlobStore for HttpBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        mime_type: &str,
        cache_control: &str,
    ) -> Result<(), AssetIoError> {
        let response = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .header(reqwest::header::CACHE_CONTROL, cache_control)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AssetIoError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssetIoError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<BlobFetch, AssetIoError> {
        let response = self
            .client
            .get(self.object_url(key))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AssetIoError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| AssetIoError::Request(e.to_string()))?;

        Ok(BlobFetch {
            status,
            body: body.to_vec(),
        })
    }
}
