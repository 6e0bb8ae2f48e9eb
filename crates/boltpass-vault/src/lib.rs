//! Debounced, encrypted persistence for a vault of records.
//!
//! [`Vault`] coalesces bursts of `store` calls into single writes, keeps at most one
//! write in flight, and reads back through the codec with a fallback for snapshots
//! written before encryption was introduced.

pub mod error;
pub mod vault;

pub use error::VaultError;
pub use vault::{CoalescerState, Vault, VaultSettings, DEFAULT_DEBOUNCE, VAULT_KEY};
