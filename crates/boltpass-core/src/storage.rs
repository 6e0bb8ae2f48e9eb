use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by key-value store implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Writing the value would exceed the store's capacity.
    #[error("quota exceeded: {needed} bytes needed, {limit} allowed")]
    QuotaExceeded { needed: usize, limit: usize },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Single-slot string store the vault persists its blob into.
/// No atomicity is assumed beyond what the backend offers for one key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieve the value for a key, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Persist a value under a key, overwriting any existing entry.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key and its value (idempotent).
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store for tests, diagnostics and ephemeral sessions.
/// An optional quota emulates the bounded storage of a browser profile.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyValueStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit total stored bytes (keys plus values).
    pub fn with_quota(limit: usize) -> Self {
        Self {
            inner: Arc::default(),
            quota: Some(limit),
        }
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let map = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut map = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        if let Some(limit) = self.quota {
            let others: usize = map
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > limit {
                return Err(StoreError::QuotaExceeded { needed, limit });
            }
        }

        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_returns_stored_value() {
        let store = InMemoryKeyValueStore::new();
        store.put("vault", "blob").await.expect("put should succeed");
        let retrieved = store.get("vault").await.expect("get should succeed");
        assert_eq!(retrieved.as_deref(), Some("blob"));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = InMemoryKeyValueStore::new();
        let retrieved = store.get("absent").await.expect("get should succeed");
        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_removes_data() {
        let store = InMemoryKeyValueStore::new();
        store.put("k", "v").await.expect("put should succeed");
        store.delete("k").await.expect("delete should succeed");
        store
            .delete("k")
            .await
            .expect("delete again should still succeed");

        assert_eq!(store.get("k").await.expect("get"), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn quota_rejects_oversized_writes_and_keeps_old_value() {
        let store = InMemoryKeyValueStore::with_quota(16);
        store.put("k", "small").await.expect("fits");

        let err = store
            .put("k", "this value is far too large")
            .await
            .expect_err("should exceed quota");
        assert!(matches!(err, StoreError::QuotaExceeded { limit: 16, .. }));
        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("small"));
    }

    #[tokio::test]
    async fn quota_counts_replacement_not_addition() {
        let store = InMemoryKeyValueStore::with_quota(10);
        store.put("k", "123456").await.expect("first write");
        store.put("k", "654321").await.expect("overwrite fits");
    }
}
