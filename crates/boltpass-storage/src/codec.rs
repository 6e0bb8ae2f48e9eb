use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::key_provider::{KeyMaterial, EMBEDDED_SECRET};

/// Failures converting between a snapshot and its stored blob.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The snapshot could not be serialized or sealed. Never expected for
    /// well-formed records.
    #[error("encoding failed: {0}")]
    Encoding(String),
    /// The blob is not ciphertext under the current key, or its plaintext does
    /// not parse as a snapshot.
    #[error("decoding failed: {0}")]
    Decoding(String),
}

/// Envelope written to the key-value store. Always a JSON object, so it can never
/// be mistaken for a plain (legacy) snapshot, which is a JSON array.
#[derive(Debug, Serialize, Deserialize)]
struct StoredBlob {
    nonce: String,
    ciphertext: String,
}

/// AES-256-GCM transform between a snapshot and an opaque string.
#[derive(Clone)]
pub struct VaultCodec {
    cipher: Aes256Gcm,
    key_id: String,
}

impl VaultCodec {
    /// Key material is always 256 bits, so building the cipher cannot fail.
    pub fn new(material: &KeyMaterial) -> Self {
        Self {
            cipher: Aes256Gcm::new(&material.bytes.into()),
            key_id: material.id.clone(),
        }
    }

    /// Codec keyed by the secret compiled into this build.
    pub fn embedded() -> Self {
        Self::new(&KeyMaterial::from_secret("embedded", EMBEDDED_SECRET))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Serialize and seal a snapshot.
    pub fn encrypt<R: Serialize>(&self, snapshot: &[R]) -> Result<String, CodecError> {
        let plaintext = serde_json::to_vec(snapshot)
            .map_err(|e| CodecError::Encoding(format!("serialize failed: {e}")))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| CodecError::Encoding(format!("encrypt failed: {e}")))?;

        let blob = StoredBlob {
            nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
            ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        };
        serde_json::to_string(&blob)
            .map_err(|e| CodecError::Encoding(format!("envelope failed: {e}")))
    }

    /// Open a blob produced by [`VaultCodec::encrypt`] under the same key.
    pub fn decrypt<R: DeserializeOwned>(&self, blob: &str) -> Result<Vec<R>, CodecError> {
        let blob: StoredBlob = serde_json::from_str(blob)
            .map_err(|e| CodecError::Decoding(format!("not an encrypted envelope: {e}")))?;

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(blob.nonce)
            .map_err(|e| CodecError::Decoding(format!("nonce decode failed: {e}")))?;
        if nonce_bytes.len() != 12 {
            return Err(CodecError::Decoding(format!(
                "expected 12-byte nonce, got {}",
                nonce_bytes.len()
            )));
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = URL_SAFE_NO_PAD
            .decode(blob.ciphertext)
            .map_err(|e| CodecError::Decoding(format!("ciphertext decode failed: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|e| CodecError::Decoding(format!("decrypt failed: {e}")))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| CodecError::Decoding(format!("snapshot parse failed: {e}")))
    }
}

impl fmt::Debug for VaultCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultCodec")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Canonical plain serialization of a snapshot, used for export and written by
/// releases that stored credentials unencrypted.
pub fn to_plain<R: Serialize>(snapshot: &[R]) -> Result<String, CodecError> {
    serde_json::to_string(snapshot).map_err(|e| CodecError::Encoding(e.to_string()))
}

/// Parse a plain snapshot. Anything other than a JSON array of records is rejected.
pub fn parse_plain<R: DeserializeOwned>(text: &str) -> Result<Vec<R>, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Decoding(e.to_string()))
}
