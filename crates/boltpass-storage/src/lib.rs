//! Concrete storage pieces for the vault: key sourcing, the AES-GCM snapshot codec,
//! and a file-backed key-value store.

pub mod codec;
pub mod file_store;
pub mod key_provider;
