use std::{
    collections::HashSet,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use boltpass_core::{record::Record, storage::KeyValueStore};
use boltpass_storage::codec::{self, VaultCodec};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{runtime::Handle, sync::Notify, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::error::VaultError;

/// Key the encrypted snapshot lives under.
pub const VAULT_KEY: &str = "boltpass_credentials";

/// Delay after the last `store` before a write is attempted.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Per-instance tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSettings {
    /// Key-value slot owned by this vault. Nothing else may write to it.
    pub key: String,
    pub debounce: Duration,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            key: VAULT_KEY.to_string(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Observable state of the write coalescer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalescerState {
    /// Nothing queued, nothing being written.
    Idle,
    /// A snapshot is queued and waiting for its timer or a flush.
    Pending,
    /// A write is in flight and nothing newer is queued.
    Writing,
    /// A write is in flight and a newer snapshot will follow it.
    PendingWhileWriting,
}

type WriteCycle = Pin<Box<dyn Future<Output = Option<Result<(), VaultError>>> + Send>>;

/// Encrypted, debounced store for a snapshot of records.
///
/// Cloning yields another handle to the same queue. Each instance owns its queue,
/// timer and in-flight flag; independent vaults never share state.
///
/// `store`, `retrieve` and `load` (on legacy data) and `import_snapshot` spawn Tokio
/// tasks and must run inside a Tokio runtime.
pub struct Vault<R, S> {
    inner: Arc<Inner<R, S>>,
}

impl<R, S> Clone for Vault<R, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<R, S> {
    store: S,
    codec: VaultCodec,
    settings: VaultSettings,
    queue: Mutex<WriteQueue<R>>,
    idle: Notify,
}

struct WriteQueue<R> {
    /// Latest snapshot not yet handed to a write. Older ones are overwritten.
    pending: Option<Vec<R>>,
    writing: bool,
    timer: Option<JoinHandle<()>>,
    /// Running `flush` calls. Background drains stand down while non-zero.
    flushers: usize,
    /// Result of the most recent write cycle.
    last_outcome: Option<Result<(), VaultError>>,
}

impl<R> WriteQueue<R> {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<R, S> Vault<R, S>
where
    R: Record + Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: KeyValueStore + 'static,
{
    pub fn new(store: S, codec: VaultCodec) -> Self {
        Self::with_settings(store, codec, VaultSettings::default())
    }

    pub fn with_settings(store: S, codec: VaultCodec, settings: VaultSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                codec,
                settings,
                queue: Mutex::new(WriteQueue {
                    pending: None,
                    writing: false,
                    timer: None,
                    flushers: 0,
                    last_outcome: None,
                }),
                idle: Notify::new(),
            }),
        }
    }

    pub fn settings(&self) -> &VaultSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> CoalescerState {
        let queue = self.inner.queue();
        match (queue.pending.is_some(), queue.writing) {
            (false, false) => CoalescerState::Idle,
            (true, false) => CoalescerState::Pending,
            (false, true) => CoalescerState::Writing,
            (true, true) => CoalescerState::PendingWhileWriting,
        }
    }

    /// Queue `snapshot` for persistence and restart the debounce timer.
    /// Fire-and-forget: write failures are logged, never returned.
    pub fn store(&self, snapshot: Vec<R>) {
        let mut queue = self.inner.queue();
        if queue.pending.replace(snapshot).is_some() {
            debug!("queued snapshot superseded");
        }
        self.inner.arm_timer(&mut queue);
    }

    /// Read the durable snapshot. Never fails: unreadable or missing data yields an
    /// empty snapshot, and legacy plain data is returned and queued for re-encryption.
    pub async fn retrieve(&self) -> Vec<R> {
        match self.load().await {
            Ok(snapshot) => snapshot,
            Err(err @ VaultError::Store(_)) => {
                warn!(error = %err, "vault read failed, returning empty snapshot");
                Vec::new()
            }
            Err(err) => {
                // Left in place for manual recovery.
                error!(error = %err, "vault blob unreadable, returning empty snapshot");
                Vec::new()
            }
        }
    }

    /// Like [`Vault::retrieve`], but tells a missing blob apart from one that is
    /// present and unreadable. Callers about to overwrite the blob should use this.
    ///
    /// Legacy plain data is migrated exactly as `retrieve` does.
    pub async fn load(&self) -> Result<Vec<R>, VaultError> {
        let blob = match self.inner.store.get(&self.inner.settings.key).await? {
            Some(blob) if !blob.trim().is_empty() => blob,
            _ => return Ok(Vec::new()),
        };

        let decrypt_err = match self.inner.codec.decrypt(&blob) {
            Ok(snapshot) => return Ok(snapshot),
            Err(err) => err,
        };
        debug!(error = %decrypt_err, "blob did not decrypt, trying legacy format");

        match codec::parse_plain::<R>(&blob) {
            Ok(snapshot) => {
                info!(
                    records = snapshot.len(),
                    "migrating legacy unencrypted vault"
                );
                self.store(snapshot.clone());
                Ok(snapshot)
            }
            Err(legacy_err) => {
                debug!(error = %legacy_err, "blob is not a legacy snapshot either");
                Err(decrypt_err.into())
            }
        }
    }

    /// Write any queued snapshot now and wait until it is durable.
    ///
    /// An in-flight write is waited out first. The result is that of the write which
    /// carried the snapshot queued (or in flight) when `flush` was called, so a
    /// failure is reported even when a background cycle picked the snapshot up.
    /// Completes immediately when idle.
    pub async fn flush(&self) -> Result<(), VaultError> {
        let _claim = FlushClaim::new(&self.inner);
        let mut waited = false;
        loop {
            let idle = self.inner.idle.notified();
            let in_flight = {
                let mut queue = self.inner.queue();
                queue.cancel_timer();
                match (queue.pending.is_some(), queue.writing) {
                    (false, false) if waited => {
                        return queue.last_outcome.clone().unwrap_or(Ok(()));
                    }
                    (false, false) => return Ok(()),
                    (_, writing) => writing,
                }
            };

            if in_flight {
                idle.await;
                waited = true;
                continue;
            }

            if let Some(result) = Arc::clone(&self.inner).drain(true).await {
                return result;
            }
        }
    }

    /// Drop any queued snapshot and remove the persisted blob.
    ///
    /// A write already in flight is neither awaited nor cancelled and may land
    /// after the delete.
    pub async fn clear(&self) {
        {
            let mut queue = self.inner.queue();
            queue.cancel_timer();
            queue.pending = None;
        }

        if let Err(err) = self.inner.store.delete(&self.inner.settings.key).await {
            warn!(error = %err, "failed to remove persisted vault");
        }
    }

    /// Plain serialization of the durable snapshot, for transfer to another vault.
    /// Callers wanting queued edits included should `flush` first.
    pub async fn export_snapshot(&self) -> Result<String, VaultError> {
        let snapshot = self.retrieve().await;
        Ok(codec::to_plain(&snapshot)?)
    }

    /// Parse a plain snapshot and queue it. Returns `false`, leaving the vault
    /// untouched, when `data` is not an array of records or repeats a record id.
    pub fn import_snapshot(&self, data: &str) -> bool {
        let snapshot = match codec::parse_plain::<R>(data) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "import rejected");
                return false;
            }
        };

        if let Some(id) = first_duplicate_id(&snapshot) {
            warn!(%id, "import rejected: duplicate record id");
            return false;
        }

        info!(records = snapshot.len(), "import accepted");
        self.store(snapshot);
        true
    }
}

impl<R, S> Inner<R, S>
where
    R: Record + Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: KeyValueStore + 'static,
{
    fn queue(&self) -> MutexGuard<'_, WriteQueue<R>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm_timer(self: &Arc<Self>, queue: &mut WriteQueue<R>) {
        queue.cancel_timer();
        let inner = Arc::clone(self);
        let delay = self.settings.debounce;
        queue.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Aborting the timer must never interrupt a write, so the drain is detached.
            tokio::spawn(inner.drain(false));
        }));
    }

    /// One write cycle. `None` when nothing was written: the queue was empty,
    /// another write is in flight (its completion re-drains), or a `flush` holds
    /// the queue and `by_flush` is unset.
    fn drain(self: Arc<Self>, by_flush: bool) -> WriteCycle {
        Box::pin(async move {
            let snapshot = {
                let mut queue = self.queue();
                if queue.writing {
                    debug!("write in flight, snapshot stays queued");
                    return None;
                }
                if !by_flush && queue.flushers > 0 {
                    debug!("flush in progress, leaving the snapshot to it");
                    return None;
                }
                let snapshot = queue.pending.take()?;
                queue.writing = true;
                snapshot
            };

            let result = self.write(&snapshot).await;
            if let Err(err) = &result {
                warn!(
                    error = %err,
                    records = snapshot.len(),
                    "vault write failed, snapshot dropped"
                );
            }

            let refilled = {
                let mut queue = self.queue();
                queue.writing = false;
                queue.last_outcome = Some(result.clone());
                queue.pending.is_some() && queue.flushers == 0
            };
            self.idle.notify_waiters();

            if refilled {
                debug!("snapshot queued during write, draining again");
                tokio::spawn(Arc::clone(&self).drain(false));
            }
            Some(result)
        })
    }

    async fn write(&self, snapshot: &[R]) -> Result<(), VaultError> {
        let blob = self.codec.encrypt(snapshot)?;
        self.store.put(&self.settings.key, &blob).await?;
        debug!(records = snapshot.len(), "vault snapshot persisted");
        Ok(())
    }
}

/// Registered for the lifetime of one `flush` call.
struct FlushClaim<R, S>
where
    R: Record + Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: KeyValueStore + 'static,
{
    inner: Arc<Inner<R, S>>,
}

impl<R, S> FlushClaim<R, S>
where
    R: Record + Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: KeyValueStore + 'static,
{
    fn new(inner: &Arc<Inner<R, S>>) -> Self {
        inner.queue().flushers += 1;
        Self {
            inner: Arc::clone(inner),
        }
    }
}

impl<R, S> Drop for FlushClaim<R, S>
where
    R: Record + Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: KeyValueStore + 'static,
{
    fn drop(&mut self) {
        let mut queue = self.inner.queue();
        queue.flushers -= 1;
        // A snapshot stored during the flush may have had its timer stand down.
        let stranded = queue.flushers == 0 && queue.pending.is_some() && !queue.writing;
        if stranded && Handle::try_current().is_ok() {
            debug!("snapshot queued during flush, re-arming timer");
            self.inner.arm_timer(&mut queue);
        }
    }
}

fn first_duplicate_id<R: Record>(snapshot: &[R]) -> Option<String> {
    let mut seen = HashSet::new();
    snapshot
        .iter()
        .map(Record::id)
        .find(|id| !seen.insert(*id))
        .map(str::to_string)
}
