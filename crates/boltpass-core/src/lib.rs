//! Core abstractions for BoltPass: the persisted record model and the key-value
//! contract the vault writes into.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod record;
pub mod storage;
