use boltpass_core::storage::StoreError;
use boltpass_storage::codec::CodecError;
use thiserror::Error;

/// Failures surfaced by [`crate::Vault::flush`], [`crate::Vault::load`] and
/// [`crate::Vault::export_snapshot`]. Every other path logs and degrades instead of
/// returning these.
#[derive(Debug, Clone, Error)]
pub enum VaultError {
    /// Snapshot could not be encoded, or a blob could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The key-value store rejected a read, write or delete.
    #[error("underlying store failure: {0}")]
    Store(#[from] StoreError),
}
