//! Lifecycle controller for savable records.
//!
//! [`DataManager`] owns the record cache and drives every key through
//! `Unloaded -> Loading -> LoadedClean <-> LoadedDirty -> Unloaded`.
//!
//! - Loads are deduplicated per key: while one is running, every other
//!   request for the same key waits on it and receives the same instance.
//! - Missing, unreadable, or undecodable data yields `T::default()`. The
//!   failure is logged and counted, never returned.
//! - `mark_dirty` only records intent. Bytes are written by `flush_all`
//!   (one write per dirty key, however often it was marked), by
//!   `save_immediately`, or by unloading a dirty record.
//! - Writes run on spawned tasks and are tracked until they finish, so a
//!   flush at suspend/quit can wait for all of them.
//! - Writes of one key are ordered by generation: a snapshot older than one
//!   already written is dropped. Loads and deletes of a key wait for its
//!   outstanding writes first.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::cache::{LoadReceiver, RecordCache, WriteBarrier, WriteTicket};
use crate::codec::{Codec, JsonCodec};
use crate::config::DataManagerConfig;
use crate::error::{Operation, Result, SaveDataError, WriteFailure};
use crate::events::{DataEvent, EventBus, LoadSource};
use crate::key::{Savable, TypeKey};
use crate::lifecycle::LifecycleHooks;
use crate::metrics::DataMetrics;
use crate::record::{ErasedRecord, Record};
use crate::storage::{FileStorage, StorageBackend};

/// Where a key currently is in its lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordState {
    Unloaded,
    Loading,
    LoadedClean,
    LoadedDirty,
}

impl RecordState {
    pub fn is_loaded(self) -> bool {
        matches!(self, RecordState::LoadedClean | RecordState::LoadedDirty)
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecordState::Unloaded => "unloaded",
            RecordState::Loading => "loading",
            RecordState::LoadedClean => "loaded (clean)",
            RecordState::LoadedDirty => "loaded (dirty)",
        };
        write!(f, "{}", label)
    }
}

struct Inner<C: Codec> {
    codec: C,
    storage: Arc<dyn StorageBackend>,
    cache: Mutex<RecordCache<C>>,
    runtime: Handle,
    events: EventBus,
    metrics: DataMetrics,
}

impl<C: Codec> Inner<C> {
    fn lock_cache(&self) -> Result<MutexGuard<'_, RecordCache<C>>> {
        self.cache.lock().map_err(|_| SaveDataError::LockPoisoned)
    }
}

/// Asynchronous, type-keyed persistence cache.
///
/// Cloning is cheap and every clone drives the same cache.
///
/// # Example
///
/// ```ignore
/// let manager = DataManager::builder()
///     .config(DataManagerConfig::from_env())
///     .build()?;
///
/// let goods = manager.load::<GoodsSaveData>().await?;
/// goods.write().gold = 61;
/// manager.mark_dirty::<GoodsSaveData>()?;
///
/// // Later, e.g. when the application loses focus
/// manager.flush_all().await?;
/// ```
pub struct DataManager<C: Codec = JsonCodec> {
    inner: Arc<Inner<C>>,
}

impl<C: Codec> Clone for DataManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl DataManager<JsonCodec> {
    /// Create a new builder using the JSON codec and file storage.
    pub fn builder() -> DataManagerBuilder<JsonCodec> {
        DataManagerBuilder::new()
    }
}

impl<C: Codec> DataManager<C> {
    // ========================================================================
    // LOADING
    // ========================================================================

    /// Start loading `T` without waiting for it.
    ///
    /// Returns immediately. The returned handle is already complete when the
    /// record is cached or has no persisted data; otherwise it resolves once
    /// the read finishes. Requests made while a load is running share it.
    pub fn load_async<T: Savable>(&self) -> Result<PendingLoad<T, C>> {
        let key = T::type_key()?;
        let mut cache = self.inner.lock_cache()?;

        if let Some(erased) = cache.try_get_loaded(&key) {
            let record = typed::<T, C>(&key, &erased)?;
            self.inner.metrics.record_cache_hit();
            return Ok(PendingLoad::ready(key, record));
        }

        if let Some(pending) = cache.try_get_in_flight(&key) {
            debug!("Joining in-flight load of '{}'", key);
            self.inner.metrics.record_dedup_hit();
            return Ok(PendingLoad::waiting(key, pending));
        }

        // A write for this key may still be landing; the read must wait for it
        let barrier = cache.write_barrier(&key);

        if barrier.is_none() && !self.inner.storage.exists(&key) {
            let record = Record::new(T::default());
            cache.commit_loaded(key.clone(), record.erase());
            drop(cache);

            debug!("No saved data for '{}', created default", key);
            self.inner.metrics.record_default();
            self.inner.events.publish(DataEvent::Loaded {
                key: key.clone(),
                source: LoadSource::Default,
            });
            return Ok(PendingLoad::ready(key, record));
        }

        let (tx, rx) = watch::channel(None);
        cache.register_in_flight(key.clone(), rx.clone());
        drop(cache);

        debug!("Loading '{}' from storage", key);
        let slot = LoadSlot {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            tx,
            committed: false,
        };
        self.inner.runtime.spawn(run_load::<T, C>(slot, barrier));

        Ok(PendingLoad::waiting(key, rx))
    }

    /// Load `T`, waiting for the read if one is needed.
    pub async fn load<T: Savable>(&self) -> Result<Record<T>> {
        self.load_async::<T>()?.wait().await
    }

    /// Blocking variant of [`load`](Self::load) for synchronous callers.
    ///
    /// # Panics
    ///
    /// Panics if the record is not cached yet and this is called from within
    /// an asynchronous execution context.
    pub fn load_blocking<T: Savable>(&self) -> Result<Record<T>> {
        let pending = self.load_async::<T>()?;
        if let LoadState::Ready(record) = &pending.state {
            return Ok(record.clone());
        }
        self.inner.runtime.block_on(pending.wait())
    }

    /// The cached record for `T`, without any I/O.
    pub fn get_loaded<T: Savable>(&self) -> Result<Option<Record<T>>> {
        let key = T::type_key()?;
        let cache = self.inner.lock_cache()?;
        cache
            .try_get_loaded(&key)
            .map(|erased| typed::<T, C>(&key, &erased))
            .transpose()
    }

    /// Wait until every load started so far has finished.
    ///
    /// Hosts call this at a point where dependent code expects consistent
    /// data, e.g. after scene initialization.
    pub async fn await_pending_loads(&self) -> Result<()> {
        let loads = self.inner.lock_cache()?.in_flight_loads();

        for (key, mut pending) in loads {
            pending
                .wait_for(Option::is_some)
                .await
                .map_err(|_| SaveDataError::LoadAborted { key })?;
        }

        Ok(())
    }

    // ========================================================================
    // STATE
    // ========================================================================

    pub fn state<T: Savable>(&self) -> Result<RecordState> {
        self.state_of(&T::type_key()?)
    }

    /// State of a key regardless of its record type.
    pub fn state_of(&self, key: &TypeKey) -> Result<RecordState> {
        let cache = self.inner.lock_cache()?;
        Ok(state_in(&cache, key))
    }

    pub fn is_loaded<T: Savable>(&self) -> Result<bool> {
        Ok(self.state::<T>()?.is_loaded())
    }

    pub fn is_dirty<T: Savable>(&self) -> Result<bool> {
        Ok(self.state::<T>()? == RecordState::LoadedDirty)
    }

    /// Keys with a cached record, sorted.
    pub fn loaded_keys(&self) -> Result<Vec<TypeKey>> {
        Ok(self.inner.lock_cache()?.loaded_keys())
    }

    // ========================================================================
    // SAVING
    // ========================================================================

    /// Mark `T` as needing persistence at the next flush.
    ///
    /// Returns `false` if it was already marked; marks between two flushes
    /// coalesce into a single write. The record must be loaded.
    pub fn mark_dirty<T: Savable>(&self) -> Result<bool> {
        let key = T::type_key()?;
        let mut cache = self.inner.lock_cache()?;
        require_loaded::<T, C>(&cache, &key, Operation::MarkDirty)?;
        Ok(cache.mark_dirty(key))
    }

    /// Write the current value of `T` now, without waiting for a flush.
    ///
    /// The value is captured before this returns; later mutations are not
    /// part of this write. The key leaves the dirty set. The write runs to
    /// completion even if the returned handle is dropped.
    pub fn save_immediately<T: Savable>(&self) -> Result<PendingWrite> {
        let key = T::type_key()?;
        let queued = {
            let mut cache = self.inner.lock_cache()?;
            let erased = require_loaded::<T, C>(&cache, &key, Operation::SaveImmediately)?;
            cache.clear_dirty(&key);
            QueuedWrite::new(&mut cache, key, erased)
        };
        Ok(self.launch_write(queued))
    }

    /// Start writing every dirty record and clear the dirty set.
    ///
    /// Returns one handle per launched write. A mark that arrives after the
    /// dirty set was drained belongs to the next flush.
    pub fn flush_all_async(&self) -> Result<Vec<PendingWrite>> {
        let queued = {
            let mut cache = self.inner.lock_cache()?;
            let mut keys: Vec<TypeKey> = cache.drain_dirty().into_iter().collect();
            keys.sort();

            let mut queued = Vec::with_capacity(keys.len());
            for key in keys {
                match cache.try_get_loaded(&key) {
                    Some(erased) => queued.push(QueuedWrite::new(&mut cache, key, erased)),
                    None => warn!("Dirty key '{}' has no cached record, skipping", key),
                }
            }
            queued
        };

        if queued.is_empty() {
            debug!("Flush requested with no dirty records");
            return Ok(Vec::new());
        }

        info!("Flushing {} dirty record(s)", queued.len());
        Ok(queued
            .into_iter()
            .map(|queued| self.launch_write(queued))
            .collect())
    }

    /// Write every dirty record and wait until all writes, including earlier
    /// fire-and-continue ones, have finished.
    ///
    /// Returns the number of records written by this flush.
    pub async fn flush_all(&self) -> Result<usize> {
        let writes = self.flush_all_async()?;
        let launched = writes.len();

        let mut failures = Vec::new();
        for write in writes {
            let key = write.key().clone();
            if let Err(error) = write.wait().await {
                failures.push(WriteFailure { key, error });
            }
        }

        self.await_pending_writes().await?;

        self.inner.metrics.record_flush();
        let written = launched - failures.len();
        self.inner.events.publish(DataEvent::Flushed { written });

        if failures.is_empty() {
            Ok(written)
        } else {
            warn!("Flush finished with {} failed write(s)", failures.len());
            Err(SaveDataError::Flush { failures })
        }
    }

    /// Blocking variant of [`flush_all`](Self::flush_all) for host lifecycle
    /// callbacks.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn flush_all_blocking(&self) -> Result<usize> {
        self.inner.runtime.block_on(self.flush_all())
    }

    /// Wait until every write launched so far has finished.
    ///
    /// Any number of callers may wait at once; each returns only when the
    /// writes it observed are done. Outcomes are reported through each
    /// write's [`PendingWrite`] and the log, not here.
    pub async fn await_pending_writes(&self) -> Result<()> {
        let barriers = self.inner.lock_cache()?.write_barriers();
        if !barriers.is_empty() {
            debug!("Waiting for writes of {} key(s)", barriers.len());
        }

        for barrier in barriers {
            barrier.wait().await;
        }
        Ok(())
    }

    // ========================================================================
    // UNLOADING & DELETION
    // ========================================================================

    /// Drop the cached record for `T`, saving it first if dirty.
    ///
    /// Returns the save that was launched, if any. Unloading a record that is
    /// not loaded is a no-op; unloading while it is still loading is an error.
    pub fn unload<T: Savable>(&self) -> Result<Option<PendingWrite>> {
        let key = T::type_key()?;
        let mut cache = self.inner.lock_cache()?;

        if cache.try_get_in_flight(&key).is_some() {
            error!("Cannot unload '{}' while it is loading", key);
            return Err(SaveDataError::InvalidState {
                key,
                state: RecordState::Loading,
                op: Operation::Unload,
            });
        }

        let Some(erased) = cache.try_get_loaded(&key) else {
            debug!("Unload of '{}' ignored, not loaded", key);
            return Ok(None);
        };
        typed::<T, C>(&key, &erased)?;

        let queued = if cache.clear_dirty(&key) {
            Some(QueuedWrite::new(&mut cache, key.clone(), erased))
        } else {
            None
        };
        cache.evict(&key);
        drop(cache);

        let write = queued.map(|queued| self.launch_write(queued));

        debug!("Unloaded '{}'", key);
        self.inner.events.publish(DataEvent::Unloaded { key });

        Ok(write)
    }

    /// Delete the persisted data of `T`. The cached record is untouched.
    pub async fn delete_one<T: Savable>(&self) -> Result<()> {
        self.delete_key(&T::type_key()?).await
    }

    /// Delete the persisted data stored under `key`. The cached record is
    /// untouched, so a later flush of a dirty record recreates the file.
    pub async fn delete_key(&self, key: &TypeKey) -> Result<()> {
        let barrier = self.inner.lock_cache()?.write_barrier(key);
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        self.inner.storage.delete_raw(key).await?;

        info!("Deleted saved data for '{}'", key);
        self.inner.events.publish(DataEvent::Deleted {
            key: Some(key.clone()),
        });
        Ok(())
    }

    /// Delete all persisted data. Cached records are untouched.
    ///
    /// Returns the number of stored entries removed.
    pub async fn delete_all(&self) -> Result<usize> {
        let barriers = self.inner.lock_cache()?.write_barriers();
        for barrier in barriers {
            barrier.wait().await;
        }

        let deleted = self.inner.storage.delete_all().await?;

        info!("Deleted all saved data ({} entries)", deleted);
        self.inner.events.publish(DataEvent::Deleted { key: None });
        Ok(deleted)
    }

    /// Keys that currently have persisted data.
    pub async fn saved_keys(&self) -> Result<Vec<TypeKey>> {
        Ok(self.inner.storage.list_keys().await?)
    }

    // ========================================================================
    // OBSERVABILITY & HOST GLUE
    // ========================================================================

    /// Subscribe to cache activity.
    pub fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.inner.events.subscribe()
    }

    pub fn metrics(&self) -> &DataMetrics {
        &self.inner.metrics
    }

    pub fn codec(&self) -> &C {
        &self.inner.codec
    }

    /// Plain functions for the host to call on focus loss and quit.
    pub fn lifecycle_hooks(&self) -> LifecycleHooks<C> {
        LifecycleHooks::new(self.clone())
    }

    /// Encode a queued snapshot and spawn its write. Encode failures are
    /// reported through the returned handle.
    ///
    /// Must be called without the cache lock: encoding takes the record's
    /// read lock, and a caller may hold its write lock while calling into
    /// the manager.
    fn launch_write(&self, queued: QueuedWrite<C>) -> PendingWrite {
        let QueuedWrite {
            key,
            record,
            ticket,
        } = queued;

        let bytes = match record.encode(&self.inner.codec) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to encode '{}': {}", key, e);
                self.inner.events.publish(DataEvent::SaveFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                });
                return PendingWrite::done(key, Err(e.into()));
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();

        self.inner.metrics.record_write_launched();
        self.inner.runtime.spawn(run_write(
            Arc::clone(&self.inner),
            key.clone(),
            ticket,
            bytes,
            reply_tx,
        ));

        PendingWrite::waiting(key, reply_rx)
    }
}

/// A snapshot picked under the cache lock, waiting to be encoded.
///
/// Its generation is allocated up front so loads and deletes of the key
/// already wait for it.
struct QueuedWrite<C: Codec> {
    key: TypeKey,
    record: ErasedRecord<C>,
    ticket: WriteTicket,
}

impl<C: Codec> QueuedWrite<C> {
    fn new(cache: &mut RecordCache<C>, key: TypeKey, record: ErasedRecord<C>) -> Self {
        let ticket = cache.begin_write(&key);
        Self {
            key,
            record,
            ticket,
        }
    }
}

/// Retires an in-flight load that ends without committing, e.g. when the
/// load task panics or the runtime shuts down under it.
///
/// The in-flight entry is removed before the sender is dropped, so a caller
/// woken by the aborted load can start a fresh one.
struct LoadSlot<C: Codec> {
    inner: Arc<Inner<C>>,
    key: TypeKey,
    tx: watch::Sender<Option<ErasedRecord<C>>>,
    committed: bool,
}

impl<C: Codec> Drop for LoadSlot<C> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Ok(mut cache) = self.inner.cache.lock()
            && cache.abandon_in_flight(&self.key)
        {
            warn!("Load of '{}' ended without a record", self.key);
        }
    }
}

fn state_in<C: Codec>(cache: &RecordCache<C>, key: &TypeKey) -> RecordState {
    if cache.try_get_loaded(key).is_some() {
        if cache.is_dirty(key) {
            RecordState::LoadedDirty
        } else {
            RecordState::LoadedClean
        }
    } else if cache.try_get_in_flight(key).is_some() {
        RecordState::Loading
    } else {
        RecordState::Unloaded
    }
}

fn typed<T: Savable, C: Codec>(key: &TypeKey, erased: &ErasedRecord<C>) -> Result<Record<T>> {
    Record::<T>::downcast(erased).ok_or_else(|| {
        error!(
            "Key '{}' is cached with a type other than {}",
            key,
            std::any::type_name::<T>()
        );
        SaveDataError::KeyTypeMismatch { key: key.clone() }
    })
}

fn require_loaded<T: Savable, C: Codec>(
    cache: &RecordCache<C>,
    key: &TypeKey,
    op: Operation,
) -> Result<ErasedRecord<C>> {
    if let Some(erased) = cache.try_get_loaded(key) {
        typed::<T, C>(key, &erased)?;
        return Ok(erased);
    }

    let state = state_in(cache, key);
    error!("Cannot {} '{}' while it is {}", op, key, state);
    Err(SaveDataError::InvalidState {
        key: key.clone(),
        state,
        op,
    })
}

/// Read and decode `T`, falling back to `T::default()` on any failure.
async fn read_record<T: Savable, C: Codec>(inner: &Inner<C>, key: &TypeKey) -> (T, LoadSource) {
    if !inner.storage.exists(key) {
        return (T::default(), LoadSource::Default);
    }

    match inner.storage.read_raw(key).await {
        Ok(bytes) => match inner.codec.decode::<T>(&bytes) {
            Ok(value) => (value, LoadSource::Disk),
            Err(e) => {
                warn!("Discarding unreadable save data for '{}': {}", key, e);
                (T::default(), LoadSource::Recovered)
            }
        },
        Err(e) if e.is_not_found() => (T::default(), LoadSource::Default),
        Err(e) => {
            warn!("Failed to read save data for '{}', using default: {}", key, e);
            (T::default(), LoadSource::Recovered)
        }
    }
}

async fn run_load<T: Savable, C: Codec>(
    mut slot: LoadSlot<C>,
    barrier: Option<WriteBarrier>,
) {
    let key = slot.key.clone();
    if let Some(barrier) = barrier {
        debug!("Load of '{}' waiting for outstanding writes", key);
        barrier.wait().await;
    }

    let inner = Arc::clone(&slot.inner);
    let (value, source) = read_record::<T, C>(&inner, &key).await;
    let erased = Record::new(value).erase::<C>();

    match inner.lock_cache() {
        Ok(mut cache) => cache.commit_loaded(key.clone(), erased.clone()),
        Err(e) => error!("Loaded '{}' but could not cache it: {}", key, e),
    }
    slot.committed = true;

    match source {
        LoadSource::Disk => inner.metrics.record_disk_load(),
        LoadSource::Default => inner.metrics.record_default(),
        LoadSource::Recovered => inner.metrics.record_recovered(),
    }
    debug!("Loaded '{}' ({:?})", key, source);
    inner.events.publish(DataEvent::Loaded { key, source });

    slot.tx.send_replace(Some(erased));
}

async fn run_write<C: Codec>(
    inner: Arc<Inner<C>>,
    key: TypeKey,
    ticket: WriteTicket,
    bytes: Vec<u8>,
    reply: oneshot::Sender<Result<()>>,
) {
    let generation = ticket.generation();
    let result = {
        let mut written = ticket.lock().await;
        if *written > generation {
            debug!("Skipping superseded write of '{}'", key);
            inner.metrics.record_write_superseded();
            Ok(())
        } else {
            let result = inner
                .storage
                .write_raw(&key, bytes)
                .await
                .map_err(SaveDataError::from);
            match &result {
                Ok(()) => {
                    *written = generation;
                    inner.metrics.record_write_completed();
                    debug!("Saved '{}'", key);
                    inner.events.publish(DataEvent::Saved { key: key.clone() });
                }
                Err(e) => {
                    inner.metrics.record_write_failed();
                    warn!("Failed to save '{}': {}", key, e);
                    inner.events.publish(DataEvent::SaveFailed {
                        key: key.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            result
        }
    };
    drop(ticket);

    // The caller may have dropped its handle; the outcome is already logged
    let _ = reply.send(result);
}

// ============================================================================
// PENDING OPERATIONS
// ============================================================================

enum LoadState<T, C: Codec> {
    Ready(Record<T>),
    Waiting(LoadReceiver<C>),
}

/// A load that may still be running. Await it (or call [`wait`](Self::wait))
/// to get the record.
pub struct PendingLoad<T, C: Codec = JsonCodec> {
    key: TypeKey,
    state: LoadState<T, C>,
}

impl<T: Savable, C: Codec> PendingLoad<T, C> {
    fn ready(key: TypeKey, record: Record<T>) -> Self {
        Self {
            key,
            state: LoadState::Ready(record),
        }
    }

    fn waiting(key: TypeKey, pending: LoadReceiver<C>) -> Self {
        Self {
            key,
            state: LoadState::Waiting(pending),
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Whether the record is available without waiting.
    pub fn is_ready(&self) -> bool {
        match &self.state {
            LoadState::Ready(_) => true,
            LoadState::Waiting(pending) => pending.borrow().is_some(),
        }
    }

    pub async fn wait(self) -> Result<Record<T>> {
        let key = self.key;
        match self.state {
            LoadState::Ready(record) => Ok(record),
            LoadState::Waiting(mut pending) => {
                let erased = pending
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| SaveDataError::LoadAborted { key: key.clone() })?
                    .clone()
                    .ok_or_else(|| SaveDataError::LoadAborted { key: key.clone() })?;
                typed::<T, C>(&key, &erased)
            }
        }
    }
}

impl<T: Savable, C: Codec> IntoFuture for PendingLoad<T, C> {
    type Output = Result<Record<T>>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

enum WriteState {
    Waiting(oneshot::Receiver<Result<()>>),
    Done(Result<()>),
}

/// A launched write. Dropping it does not cancel the write.
pub struct PendingWrite {
    key: TypeKey,
    state: WriteState,
}

impl PendingWrite {
    fn waiting(key: TypeKey, reply: oneshot::Receiver<Result<()>>) -> Self {
        Self {
            key,
            state: WriteState::Waiting(reply),
        }
    }

    fn done(key: TypeKey, result: Result<()>) -> Self {
        Self {
            key,
            state: WriteState::Done(result),
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Wait for the write to finish and return its outcome.
    pub async fn wait(self) -> Result<()> {
        match self.state {
            WriteState::Done(result) => result,
            WriteState::Waiting(reply) => reply
                .await
                .map_err(|_| SaveDataError::WriteAborted { key: self.key })?,
        }
    }
}

impl IntoFuture for PendingWrite {
    type Output = Result<()>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWrite")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for [`DataManager`].
pub struct DataManagerBuilder<C: Codec = JsonCodec> {
    config: DataManagerConfig,
    codec: C,
    storage: Option<Arc<dyn StorageBackend>>,
    runtime: Option<Handle>,
}

impl DataManagerBuilder<JsonCodec> {
    fn new() -> Self {
        Self {
            config: DataManagerConfig::default(),
            codec: JsonCodec::default(),
            storage: None,
            runtime: None,
        }
    }
}

impl<C: Codec> DataManagerBuilder<C> {
    /// Override configuration
    pub fn config(mut self, config: DataManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Store record files under `root_dir`
    pub fn root_dir(mut self, root_dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.root_dir = root_dir.into();
        self
    }

    /// Use another codec. File names follow its extension.
    pub fn codec<D: Codec>(self, codec: D) -> DataManagerBuilder<D> {
        DataManagerBuilder {
            config: self.config,
            codec,
            storage: self.storage,
            runtime: self.runtime,
        }
    }

    /// Use a custom storage backend instead of files under `root_dir`
    pub fn storage(self, storage: impl StorageBackend + 'static) -> Self {
        self.shared_storage(Arc::new(storage))
    }

    pub fn shared_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Runtime that runs loads and writes.
    ///
    /// Defaults to the runtime `build` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<DataManager<C>> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| SaveDataError::NoRuntime)?,
        };

        let storage = match self.storage {
            Some(storage) => storage,
            None => {
                info!(
                    "Storing save data under {}",
                    self.config.root_dir.display()
                );
                Arc::new(
                    FileStorage::new(&self.config.root_dir, self.codec.extension())
                        .with_atomic_writes(self.config.atomic_writes),
                )
            }
        };

        Ok(DataManager {
            inner: Arc::new(Inner {
                codec: self.codec,
                storage,
                cache: Mutex::new(RecordCache::new()),
                runtime,
                events: EventBus::with_capacity(self.config.event_buffer_size),
                metrics: DataMetrics::new(),
            }),
        })
    }
}
