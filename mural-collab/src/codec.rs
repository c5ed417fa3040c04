//! Scene and attachment codec: canonical encoding, encryption, compression.
//!
//! Scenes are serialized to canonical JSON bytes and sealed with
//! XChaCha20-Poly1305 under the room key, with a fresh random 24-byte nonce
//! per call — the nonce travels alongside the ciphertext in the stored
//! document. Attachments are bincode archives (metadata + payload), LZ4
//! compressed, optionally sealed with the same primitive (nonce prepended).
//!
//! Wrong key or corrupted bytes surface as [`CodecError::Decryption`] from
//! the AEAD primitive; nothing is swallowed or replaced by an empty scene.

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::scene::{SceneElement, SyncableScene};
use crate::session::RoomKey;

/// MIME type recorded for attachments that don't declare one.
pub const MIME_BINARY: &str = "application/octet-stream";

/// XChaCha20 nonce length (the document's `iv` field).
pub const NONCE_LEN: usize = 24;

/// Codec errors.
#[derive(Debug, Clone)]
pub enum CodecError {
    /// Scene/archive could not be serialized
    Serialization(String),
    /// Decrypted bytes are not a valid scene/archive
    Deserialization(String),
    /// AEAD sealing failed
    Encryption(String),
    /// Wrong key, corrupted ciphertext, or malformed nonce
    Decryption(String),
    /// LZ4 decompression failed
    Decompression(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Serialization(e) => write!(f, "Serialization error: {e}"),
            CodecError::Deserialization(e) => write!(f, "Deserialization error: {e}"),
            CodecError::Encryption(e) => write!(f, "Encryption error: {e}"),
            CodecError::Decryption(e) => write!(f, "Decryption error: {e}"),
            CodecError::Decompression(e) => write!(f, "Decompression error: {e}"),
        }
    }
}

impl std::error::Error for CodecError {}

/// An encrypted scene payload plus the nonce it was sealed with.
#[derive(Debug, Clone)]
pub struct EncryptedScene {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; NONCE_LEN],
}

fn cipher(key: &RoomKey) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

fn fresh_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Serialize and seal a syncable scene under the room key.
///
/// Pure transform. Output length is deterministic for a given scene, the
/// ciphertext bytes never are (fresh nonce each call).
pub fn encrypt_scene(key: &RoomKey, scene: &SyncableScene) -> Result<EncryptedScene, CodecError> {
    let plaintext = serde_json::to_vec(scene.elements())
        .map_err(|e| CodecError::Serialization(e.to_string()))?;

    let iv = fresh_nonce();
    let ciphertext = cipher(key)
        .encrypt(XNonce::from_slice(&iv), plaintext.as_slice())
        .map_err(|e| CodecError::Encryption(format!("{e:?}")))?;

    Ok(EncryptedScene { ciphertext, iv })
}

/// Open and deserialize a stored scene payload.
pub fn decrypt_scene(
    iv: &[u8],
    ciphertext: &[u8],
    key: &RoomKey,
) -> Result<Vec<SceneElement>, CodecError> {
    if iv.len() != NONCE_LEN {
        return Err(CodecError::Decryption(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            iv.len()
        )));
    }

    let plaintext = cipher(key)
        .decrypt(XNonce::from_slice(iv), ciphertext)
        .map_err(|e| CodecError::Decryption(format!("{e:?}")))?;

    serde_json::from_slice(&plaintext).map_err(|e| CodecError::Deserialization(e.to_string()))
}

/// Metadata embedded alongside an attachment payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    pub mime_type: String,
    /// Milliseconds since epoch; absent when the writer didn't record it.
    pub created: Option<u64>,
}

impl Default for AttachmentMetadata {
    fn default() -> Self {
        Self {
            mime_type: MIME_BINARY.to_owned(),
            created: None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct AttachmentArchive {
    metadata: AttachmentMetadata,
    payload: Vec<u8>,
}

/// Pack an attachment payload with its metadata: bincode archive, LZ4
/// compressed, sealed with `key` when given (nonce prepended).
pub fn pack_attachment(
    metadata: &AttachmentMetadata,
    payload: &[u8],
    key: Option<&RoomKey>,
) -> Result<Vec<u8>, CodecError> {
    let archive = AttachmentArchive {
        metadata: metadata.clone(),
        payload: payload.to_vec(),
    };
    let encoded = bincode::serde::encode_to_vec(&archive, bincode::config::standard())
        .map_err(|e| CodecError::Serialization(e.to_string()))?;

    let compressed = lz4_flex::compress_prepend_size(&encoded);

    match key {
        None => Ok(compressed),
        Some(key) => {
            let iv = fresh_nonce();
            let sealed = cipher(key)
                .encrypt(XNonce::from_slice(&iv), compressed.as_slice())
                .map_err(|e| CodecError::Encryption(format!("{e:?}")))?;

            let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
            blob.extend_from_slice(&iv);
            blob.extend_from_slice(&sealed);
            Ok(blob)
        }
    }
}

/// Inverse of [`pack_attachment`].
pub fn unpack_attachment(
    bytes: &[u8],
    key: Option<&RoomKey>,
) -> Result<(AttachmentMetadata, Vec<u8>), CodecError> {
    let compressed = match key {
        None => bytes.to_vec(),
        Some(key) => {
            if bytes.len() < NONCE_LEN {
                return Err(CodecError::Decryption(format!(
                    "blob shorter than the {NONCE_LEN}-byte nonce"
                )));
            }
            let (iv, sealed) = bytes.split_at(NONCE_LEN);
            cipher(key)
                .decrypt(XNonce::from_slice(iv), sealed)
                .map_err(|e| CodecError::Decryption(format!("{e:?}")))?
        }
    };

    let encoded = lz4_flex::decompress_size_prepended(&compressed)
        .map_err(|e| CodecError::Decompression(e.to_string()))?;

    let (archive, _): (AttachmentArchive, _) =
        bincode::serde::decode_from_slice(&encoded, bincode::config::standard())
            .map_err(|e| CodecError::Deserialization(e.to_string()))?;

    Ok((archive.metadata, archive.payload))
}
