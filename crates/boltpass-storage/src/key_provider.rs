use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Secret compiled into the binary. Changing it invalidates every blob written with
/// the previous value; the codec then falls back to the legacy parser or reports empty.
pub const EMBEDDED_SECRET: &str = "boltpass_v2_secure_storage";

/// Key material used for encryption at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Identifier for logging/rotation (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; 32],
}

impl KeyMaterial {
    /// Derive a key from a passphrase with a single SHA-256 pass.
    pub fn from_secret(id: impl Into<String>, secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self {
            id: id.into(),
            bytes,
        }
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Provides the key the vault codec encrypts with.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Derives the key from a build-time secret. Protects the stored blob from casual
/// inspection only: the secret ships with the code that uses it.
#[derive(Debug, Clone)]
pub struct EmbeddedKeyProvider {
    secret: &'static str,
}

impl EmbeddedKeyProvider {
    pub fn new(secret: &'static str) -> Self {
        Self { secret }
    }
}

impl Default for EmbeddedKeyProvider {
    fn default() -> Self {
        Self::new(EMBEDDED_SECRET)
    }
}

#[async_trait]
impl KeyProvider for EmbeddedKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        Ok(KeyMaterial::from_secret("embedded", self.secret))
    }
}

/// OS keyring-backed provider. Uses the `keyring` crate to store a random key.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        // Keyring operations are synchronous; wrap in async for trait compatibility.
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|err| KeyError::Keyring(err.to_string()))?;

        if let Ok(secret) = entry.get_password() {
            return decode_key(&secret);
        }

        let material = generate_key()?;
        entry
            .set_password(&encode_key(&material))
            .map_err(|e| KeyError::Keyring(e.to_string()))?;
        Ok(material)
    }
}

fn generate_key() -> Result<KeyMaterial, KeyError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| KeyError::Generation(e.to_string()))?;
    Ok(KeyMaterial {
        id: "keyring".to_string(),
        bytes,
    })
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(secret: &str) -> Result<KeyMaterial, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        KeyError::Decode(format!("expected 32 bytes, got {}", bytes.len()))
    })?;

    Ok(KeyMaterial {
        id: "keyring".to_string(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_random() {
        let first = generate_key().expect("generate");
        let second = generate_key().expect("generate");
        assert_ne!(first.bytes, second.bytes);
        assert_eq!(first.id, "keyring");
    }

    #[tokio::test]
    async fn embedded_provider_is_deterministic() {
        let first = EmbeddedKeyProvider::default().get_or_create().await.unwrap();
        let second = EmbeddedKeyProvider::default().get_or_create().await.unwrap();
        assert_eq!(first, second);

        let rotated = EmbeddedKeyProvider::new("another secret")
            .get_or_create()
            .await
            .unwrap();
        assert_ne!(first.bytes, rotated.bytes);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = decode_key("abcd").expect_err("should reject wrong length");
        assert!(matches!(err, KeyError::Decode(_)));
    }

    #[test]
    fn encoded_key_decodes_back() {
        let material = KeyMaterial::from_secret("keyring", "pass");
        let decoded = decode_key(&encode_key(&material)).expect("decode");
        assert_eq!(decoded.bytes, material.bytes);
    }
}
