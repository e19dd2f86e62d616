use lru::LruCache;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

/// Run-scoped memo table.
///
/// Each key holds at most one value and the first value stored wins. Concurrent
/// `get_or_insert_with` calls for the same key share a single initialization.
/// With a capacity the least recently used entries are evicted first.
#[derive(Clone)]
pub struct Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<Mutex<LruCache<K, Arc<OnceCell<V>>>>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// `None` (or zero) means unbounded.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        let entries = match capacity.and_then(NonZeroUsize::new) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            inner: Arc::new(Mutex::new(entries)),
        }
    }

    /// Returns the stored value. Entries still being initialized read as absent.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock().await;
        let value = cache.get(key).and_then(|cell| cell.get().cloned());
        if value.is_some() {
            debug!("Cache HIT");
        } else {
            debug!("Cache MISS");
        }
        value
    }

    /// Stores `value` unless the key already holds one.
    pub async fn put(&self, key: K, value: V) {
        let mut cache = self.inner.lock().await;
        let cell = cache.get_or_insert(key, || Arc::new(OnceCell::new()));
        if cell.set(value).is_err() {
            debug!("Cache PUT ignored, key already set");
        } else {
            debug!("Cache PUT");
        }
    }

    /// Returns the value for `key`, running `init` only if no value exists or is
    /// in flight for it.
    pub async fn get_or_insert_with<F, Fut>(&self, key: K, init: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut cache = self.inner.lock().await;
            match cache.get(&key) {
                Some(cell) => {
                    debug!("Cache HIT");
                    Arc::clone(cell)
                }
                None => {
                    debug!("Cache MISS");
                    let cell = Arc::new(OnceCell::new());
                    cache.put(key, Arc::clone(&cell));
                    cell
                }
            }
        };
        cell.get_or_init(init).await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
        debug!("Cache CLEAR");
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}
