use std::path::PathBuf;

use boltpass_core::record::Credential;
use boltpass_storage::{
    codec::VaultCodec,
    file_store::FileKeyValueStore,
    key_provider::{EmbeddedKeyProvider, KeyProvider, KeyringProvider},
};
use boltpass_vault::{Vault, VaultSettings};
use color_eyre::Result;
use dirs::data_dir;
use tracing::debug;

use crate::config::{Config, KeySource};

/// Vault over the on-disk store, as used by every command.
pub type CredentialVault = Vault<Credential, FileKeyValueStore>;

/// Resolve the default data directory for BoltPass.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("boltpass"))
}

/// File store rooted at the configured (or default) data directory.
pub fn store_from_config(config: &Config) -> Result<FileKeyValueStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, "initializing vault store");
    Ok(FileKeyValueStore::new(root))
}

/// Codec keyed according to `key_source`.
pub async fn codec_from_config(config: &Config) -> Result<VaultCodec> {
    let material = match config.key_source {
        KeySource::Embedded => EmbeddedKeyProvider::default().get_or_create().await?,
        KeySource::Keyring => {
            KeyringProvider::new("boltpass", "vault-key")
                .get_or_create()
                .await?
        }
    };
    debug!(key_id = %material.id, "vault key resolved");
    Ok(VaultCodec::new(&material))
}

/// Build the credential vault described by `config`.
pub async fn vault_from_config(config: &Config) -> Result<CredentialVault> {
    let store = store_from_config(config)?;
    let codec = codec_from_config(config).await?;
    let settings = VaultSettings {
        debounce: config.debounce(),
        ..VaultSettings::default()
    };
    Ok(Vault::with_settings(store, codec, settings))
}

/// Helper for tests to construct a vault rooted at a temp dir.
#[cfg(test)]
pub fn test_vault(root: impl Into<PathBuf>) -> CredentialVault {
    Vault::new(FileKeyValueStore::new(root), VaultCodec::embedded())
}
