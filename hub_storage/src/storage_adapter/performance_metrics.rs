//! A storage adapter which records performance metrics.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{
    Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeys, StorePrefix, WritableStorageTraits,
};

/// A point-in-time copy of the counters of a [`PerformanceMetricsStorageAdapter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformanceMetrics {
    /// Bytes returned by `get`.
    pub bytes_read: usize,
    /// Bytes passed to `set`.
    pub bytes_written: usize,
    /// `get` requests, including requests for missing keys.
    pub reads: usize,
    /// `set` requests.
    pub writes: usize,
    /// Keys passed to `erase`/`erase_values`.
    pub keys_erased: usize,
    /// `erase_prefix` requests.
    pub prefixes_erased: usize,
    /// `list` and `list_prefix` requests.
    pub lists: usize,
}

/// The performance metrics storage adapter. Accumulates metrics, such as bytes read and written.
///
/// It is intended to aid in testing by allowing the application to validate that metrics match
/// expected values for specific operations, e.g. that growing a dataset does not write any chunks.
///
/// ### Example
/// ```rust
/// # use std::sync::Arc;
/// # use hub_storage::store::MemoryStore;
/// # use hub_storage::storage_adapter::performance_metrics::PerformanceMetricsStorageAdapter;
/// let store = Arc::new(MemoryStore::new());
/// let store = Arc::new(PerformanceMetricsStorageAdapter::new(store));
/// // do some store operations...
/// assert_eq!(store.metrics().writes, 0);
/// ```
#[derive(Debug)]
pub struct PerformanceMetricsStorageAdapter<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    bytes_read: AtomicUsize,
    bytes_written: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
    keys_erased: AtomicUsize,
    prefixes_erased: AtomicUsize,
    lists: AtomicUsize,
}

impl<TStorage: ?Sized> PerformanceMetricsStorageAdapter<TStorage> {
    /// Create a new performance metrics storage adapter.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self {
            storage,
            bytes_read: AtomicUsize::default(),
            bytes_written: AtomicUsize::default(),
            reads: AtomicUsize::default(),
            writes: AtomicUsize::default(),
            keys_erased: AtomicUsize::default(),
            prefixes_erased: AtomicUsize::default(),
            lists: AtomicUsize::default(),
        }
    }

    /// Reset the performance metrics.
    pub fn reset(&self) {
        for counter in [
            &self.bytes_read,
            &self.bytes_written,
            &self.reads,
            &self.writes,
            &self.keys_erased,
            &self.prefixes_erased,
            &self.lists,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Returns a snapshot of the performance metrics.
    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            keys_erased: self.keys_erased.load(Ordering::Relaxed),
            prefixes_erased: self.prefixes_erased.load(Ordering::Relaxed),
            lists: self.lists.load(Ordering::Relaxed),
        }
    }

    /// Returns the wrapped storage.
    pub fn inner(&self) -> &Arc<TStorage> {
        &self.storage
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> ReadableStorageTraits
    for PerformanceMetricsStorageAdapter<TStorage>
{
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let value = self.storage.get(key);
        let bytes_read = value
            .as_ref()
            .map_or(0, |v| v.as_ref().map_or(0, Bytes::len));
        self.bytes_read.fetch_add(bytes_read, Ordering::Relaxed);
        self.reads.fetch_add(1, Ordering::Relaxed);
        value
    }
}

impl<TStorage: ?Sized + ListableStorageTraits> ListableStorageTraits
    for PerformanceMetricsStorageAdapter<TStorage>
{
    fn list(&self) -> Result<StoreKeys, StorageError> {
        self.lists.fetch_add(1, Ordering::Relaxed);
        self.storage.list()
    }

    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        self.lists.fetch_add(1, Ordering::Relaxed);
        self.storage.list_prefix(prefix)
    }
}

impl<TStorage: ?Sized + WritableStorageTraits> WritableStorageTraits
    for PerformanceMetricsStorageAdapter<TStorage>
{
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.bytes_written.fetch_add(value.len(), Ordering::Relaxed);
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.storage.set(key, value)
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.keys_erased.fetch_add(1, Ordering::Relaxed);
        self.storage.erase(key)
    }

    fn erase_values(&self, keys: &[StoreKey]) -> Result<(), StorageError> {
        self.keys_erased.fetch_add(keys.len(), Ordering::Relaxed);
        self.storage.erase_values(keys)
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        self.prefixes_erased.fetch_add(1, Ordering::Relaxed);
        self.storage.erase_prefix(prefix)
    }
}
