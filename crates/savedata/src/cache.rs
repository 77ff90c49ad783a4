//! In-memory record cache: loaded records, dirty set, in-flight loads and
//! per-key write ordering.
//!
//! The cache does no I/O and never blocks. [`DataManager`](crate::DataManager)
//! keeps it behind a single mutex, which is what makes `drain_dirty` atomic
//! with respect to concurrent `mark_dirty` calls: a mark that arrives after a
//! drain simply lands in the next cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, watch};

use crate::codec::Codec;
use crate::key::TypeKey;
use crate::record::ErasedRecord;

/// Receiving side of an in-flight load. Holds `Some` once the record is ready.
pub(crate) type LoadReceiver<C> = watch::Receiver<Option<ErasedRecord<C>>>;

/// Serializes writes of one key and publishes which generations are done.
struct WriteGate {
    /// Highest generation that reached storage.
    written: AsyncMutex<u64>,
    /// Writes launched but not finished, whether they end written, skipped
    /// or failed.
    outstanding: watch::Sender<usize>,
}

impl WriteGate {
    fn new() -> Self {
        Self {
            written: AsyncMutex::new(0),
            outstanding: watch::Sender::new(0),
        }
    }

    fn start(&self) {
        self.outstanding.send_modify(|count| *count += 1);
    }

    fn finish(&self) {
        self.outstanding
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// One launched write of a key.
///
/// Finishes its generation when dropped, including when the write task panics
/// or is cancelled, so barriers over the key always resolve.
pub(crate) struct WriteTicket {
    generation: u64,
    gate: Arc<WriteGate>,
}

impl WriteTicket {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Exclusive access to the highest generation written for this key.
    pub(crate) async fn lock(&self) -> AsyncMutexGuard<'_, u64> {
        self.gate.written.lock().await
    }
}

impl Drop for WriteTicket {
    fn drop(&mut self) {
        self.gate.finish();
    }
}

/// Waits until a key has no unfinished writes.
pub(crate) struct WriteBarrier {
    outstanding: watch::Receiver<usize>,
}

impl WriteBarrier {
    pub(crate) async fn wait(mut self) {
        // The sender lives as long as the cache entry, which is never removed.
        let _ = self.outstanding.wait_for(|count| *count == 0).await;
    }
}

/// Per-key cache state. See the module docs for the locking contract.
pub(crate) struct RecordCache<C: Codec> {
    loaded: HashMap<TypeKey, ErasedRecord<C>>,
    dirty: HashSet<TypeKey>,
    in_flight: HashMap<TypeKey, LoadReceiver<C>>,
    writes: HashMap<TypeKey, Arc<WriteGate>>,
    next_generation: u64,
}

impl<C: Codec> RecordCache<C> {
    pub(crate) fn new() -> Self {
        Self {
            loaded: HashMap::new(),
            dirty: HashSet::new(),
            in_flight: HashMap::new(),
            writes: HashMap::new(),
            next_generation: 1,
        }
    }

    pub(crate) fn try_get_loaded(&self, key: &TypeKey) -> Option<ErasedRecord<C>> {
        self.loaded.get(key).cloned()
    }

    pub(crate) fn try_get_in_flight(&self, key: &TypeKey) -> Option<LoadReceiver<C>> {
        self.in_flight.get(key).cloned()
    }

    /// Record a pending load. Returns `false` without replacing anything if
    /// one is already registered for `key`.
    pub(crate) fn register_in_flight(&mut self, key: TypeKey, pending: LoadReceiver<C>) -> bool {
        if self.in_flight.contains_key(&key) {
            return false;
        }
        self.in_flight.insert(key, pending);
        true
    }

    /// Forget a load that ended without committing a record.
    pub(crate) fn abandon_in_flight(&mut self, key: &TypeKey) -> bool {
        self.in_flight.remove(key).is_some()
    }

    /// Install `record` for `key` and retire its in-flight entry.
    pub(crate) fn commit_loaded(&mut self, key: TypeKey, record: ErasedRecord<C>) {
        self.in_flight.remove(&key);
        self.loaded.insert(key, record);
    }

    /// Returns `false` if `key` was already dirty.
    pub(crate) fn mark_dirty(&mut self, key: TypeKey) -> bool {
        self.dirty.insert(key)
    }

    /// Returns whether `key` was dirty.
    pub(crate) fn clear_dirty(&mut self, key: &TypeKey) -> bool {
        self.dirty.remove(key)
    }

    pub(crate) fn is_dirty(&self, key: &TypeKey) -> bool {
        self.dirty.contains(key)
    }

    /// Empty the dirty set and return what it held.
    pub(crate) fn drain_dirty(&mut self) -> HashSet<TypeKey> {
        std::mem::take(&mut self.dirty)
    }

    /// Drop the cached record and its dirty mark.
    pub(crate) fn evict(&mut self, key: &TypeKey) -> Option<ErasedRecord<C>> {
        self.dirty.remove(key);
        self.loaded.remove(key)
    }

    pub(crate) fn loaded_keys(&self) -> Vec<TypeKey> {
        let mut keys: Vec<TypeKey> = self.loaded.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn in_flight_loads(&self) -> Vec<(TypeKey, LoadReceiver<C>)> {
        self.in_flight
            .iter()
            .map(|(key, rx)| (key.clone(), rx.clone()))
            .collect()
    }

    /// Allocate the next write generation for `key`.
    ///
    /// Barriers taken from now on wait for this write until the returned
    /// ticket is dropped.
    pub(crate) fn begin_write(&mut self, key: &TypeKey) -> WriteTicket {
        let generation = self.next_generation;
        self.next_generation += 1;

        let gate = self
            .writes
            .entry(key.clone())
            .or_insert_with(|| Arc::new(WriteGate::new()));
        gate.start();
        WriteTicket {
            generation,
            gate: Arc::clone(gate),
        }
    }

    /// Barrier over writes of `key` that have not finished yet, if any.
    pub(crate) fn write_barrier(&self, key: &TypeKey) -> Option<WriteBarrier> {
        let outstanding = self.writes.get(key)?.outstanding.subscribe();
        if *outstanding.borrow() == 0 {
            return None;
        }
        Some(WriteBarrier { outstanding })
    }

    /// Barriers for every key with unfinished writes.
    pub(crate) fn write_barriers(&self) -> Vec<WriteBarrier> {
        self.writes
            .keys()
            .filter_map(|key| self.write_barrier(key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::key::Savable;
    use crate::record::Record;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Goods {
        gold: u32,
    }

    impl Savable for Goods {
        const KEY: &'static str = "Goods";
    }

    fn key(name: &str) -> TypeKey {
        TypeKey::new(name).unwrap()
    }

    fn record() -> ErasedRecord<JsonCodec> {
        Record::new(Goods::default()).erase()
    }

    #[test]
    fn test_mark_dirty_coalesces() {
        let mut cache = RecordCache::<JsonCodec>::new();
        cache.commit_loaded(key("Goods"), record());

        assert!(cache.mark_dirty(key("Goods")));
        assert!(!cache.mark_dirty(key("Goods")));
        assert!(!cache.mark_dirty(key("Goods")));

        let drained = cache.drain_dirty();
        assert_eq!(drained.len(), 1);
        assert!(cache.drain_dirty().is_empty());

        // A mark after the drain lands in the next cycle
        assert!(cache.mark_dirty(key("Goods")));
        assert!(cache.is_dirty(&key("Goods")));
    }

    #[test]
    fn test_register_in_flight_once() {
        let mut cache = RecordCache::<JsonCodec>::new();
        let (_tx, rx) = watch::channel(None);

        assert!(cache.register_in_flight(key("Goods"), rx.clone()));
        assert!(!cache.register_in_flight(key("Goods"), rx));
        assert!(cache.try_get_in_flight(&key("Goods")).is_some());

        cache.commit_loaded(key("Goods"), record());
        assert!(cache.try_get_in_flight(&key("Goods")).is_none());
        assert!(cache.try_get_loaded(&key("Goods")).is_some());
    }

    #[test]
    fn test_evict_clears_dirty() {
        let mut cache = RecordCache::<JsonCodec>::new();
        cache.commit_loaded(key("Goods"), record());
        cache.mark_dirty(key("Goods"));

        assert!(cache.evict(&key("Goods")).is_some());
        assert!(!cache.is_dirty(&key("Goods")));
        assert!(cache.try_get_loaded(&key("Goods")).is_none());
        assert!(cache.evict(&key("Goods")).is_none());
    }

    #[test]
    fn test_abandon_in_flight() {
        let mut cache = RecordCache::<JsonCodec>::new();
        let (_tx, rx) = watch::channel(None);
        cache.register_in_flight(key("Goods"), rx);

        assert!(cache.abandon_in_flight(&key("Goods")));
        assert!(cache.try_get_in_flight(&key("Goods")).is_none());
        assert!(!cache.abandon_in_flight(&key("Goods")));
    }

    #[test]
    fn test_write_barrier_tracks_generations() {
        let mut cache = RecordCache::<JsonCodec>::new();
        assert!(cache.write_barrier(&key("Goods")).is_none());

        let first = cache.begin_write(&key("Goods"));
        let second = cache.begin_write(&key("Goods"));
        let other = cache.begin_write(&key("Other"));
        assert!(first.generation() < second.generation());
        assert!(second.generation() < other.generation());
        assert_eq!(cache.write_barriers().len(), 2);

        drop(first);
        assert!(cache.write_barrier(&key("Goods")).is_some());

        drop(second);
        assert!(cache.write_barrier(&key("Goods")).is_none());
        assert_eq!(cache.write_barriers().len(), 1);

        drop(other);
        assert!(cache.write_barriers().is_empty());
    }

    #[test]
    fn test_newer_write_finishing_first_keeps_barrier() {
        let mut cache = RecordCache::<JsonCodec>::new();
        let first = cache.begin_write(&key("Goods"));
        let second = cache.begin_write(&key("Goods"));

        drop(second);
        assert!(cache.write_barrier(&key("Goods")).is_some());
        drop(first);
        assert!(cache.write_barrier(&key("Goods")).is_none());
    }

    #[tokio::test]
    async fn test_write_barrier_wait_returns_when_finished() {
        let mut cache = RecordCache::<JsonCodec>::new();
        let ticket = cache.begin_write(&key("Goods"));
        let barrier = cache.write_barrier(&key("Goods")).unwrap();

        let waiter = tokio::spawn(barrier.wait());
        drop(ticket);
        waiter.await.unwrap();
    }
}
