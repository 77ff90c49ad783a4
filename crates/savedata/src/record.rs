//! Shared record handles and their type-erased form held by the cache.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::codec::Codec;
use crate::error::CodecError;
use crate::key::Savable;

/// Shared handle to a cached record.
///
/// Every handle for the same key points at the same instance until the record
/// is unloaded, so a mutation through one handle is visible through all of
/// them and is what the next save persists. The cache is not told about
/// mutations; call [`DataManager::mark_dirty`](crate::DataManager::mark_dirty)
/// after changing data that should be saved.
pub struct Record<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Record<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    pub(crate) fn from_arc(inner: Arc<RwLock<T>>) -> Self {
        Self { inner }
    }

    /// Shared read access. A panic in another writer does not poison the
    /// record; the data is returned as left behind.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with mutable access and return its result.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.write())
    }

    /// Whether both handles point at the same cached instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> Record<T> {
    /// Copy of the current value.
    pub fn snapshot(&self) -> T {
        self.read().clone()
    }
}

impl<T> Clone for Record<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Record<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Record").field(&*self.read()).finish()
    }
}

/// Cached record with its concrete type erased.
///
/// Parameterized by the codec so a flush can encode records whose types it
/// does not know.
pub(crate) trait StoredRecord<C: Codec>: Send + Sync {
    fn encode(&self, codec: &C) -> Result<Vec<u8>, CodecError>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<C: Codec, T: Savable> StoredRecord<C> for RwLock<T> {
    fn encode(&self, codec: &C) -> Result<Vec<u8>, CodecError> {
        let value = self.read().unwrap_or_else(PoisonError::into_inner);
        codec.encode(&*value)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub(crate) type ErasedRecord<C> = Arc<dyn StoredRecord<C>>;

impl<T: Savable> Record<T> {
    pub(crate) fn erase<C: Codec>(&self) -> ErasedRecord<C> {
        self.inner.clone()
    }

    /// Recover a typed handle. `None` if the cached record is of another type.
    pub(crate) fn downcast<C: Codec>(erased: &ErasedRecord<C>) -> Option<Self> {
        Arc::clone(erased)
            .into_any()
            .downcast::<RwLock<T>>()
            .ok()
            .map(Record::from_arc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Goods {
        gold: u32,
    }

    impl Savable for Goods {
        const KEY: &'static str = "Goods";
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Other;

    impl Savable for Other {
        const KEY: &'static str = "Goods";
    }

    #[test]
    fn test_clones_share_instance() {
        let record = Record::new(Goods::default());
        let other = record.clone();

        other.update(|goods| goods.gold = 61);
        assert_eq!(record.read().gold, 61);
        assert!(record.ptr_eq(&other));
        assert!(!record.ptr_eq(&Record::new(Goods::default())));
    }

    #[test]
    fn test_erase_and_downcast() {
        let record = Record::new(Goods { gold: 7 });
        let erased: ErasedRecord<JsonCodec> = record.erase();

        let back = Record::<Goods>::downcast(&erased).unwrap();
        assert!(back.ptr_eq(&record));
        assert!(Record::<Other>::downcast(&erased).is_none());

        let bytes = erased.encode(&JsonCodec::compact()).unwrap();
        assert_eq!(bytes, br#"{"gold":7}"#.to_vec());
    }
}
