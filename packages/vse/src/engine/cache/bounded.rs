use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Thread-safe LRU with an optional time-to-live per entry.
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, (V, Instant)>>,
    ttl: Option<Duration>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    // A panic while holding the lock cannot leave the LRU itself inconsistent.
    fn lock(&self) -> MutexGuard<'_, LruCache<K, (V, Instant)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn expired(&self, inserted: Instant) -> bool {
        self.ttl.is_some_and(|ttl| inserted.elapsed() >= ttl)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let state = entries
            .get(key)
            .map(|(value, inserted)| (!self.expired(*inserted)).then(|| value.clone()));
        match state {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: K, value: V) {
        self.lock().put(key, (value, Instant::now()));
    }

    /// Stores `value` only if `still_valid` holds while the lock is held.
    pub fn put_if(&self, key: K, value: V, still_valid: impl FnOnce() -> bool) -> bool {
        let mut entries = self.lock();
        if !still_valid() {
            return false;
        }
        entries.put(key, (value, Instant::now()));
        true
    }

    /// Returns the cached value or stores what `load` produces. The loader
    /// runs without holding the lock; errors are not cached.
    pub fn get_or_load<E>(&self, key: K, load: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = load()?;
        self.put(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.lock().pop(key).is_some()
    }

    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    /// Drops every entry matching `pred`; returns how many were dropped.
    pub fn invalidate_where(&self, mut pred: impl FnMut(&K, &V) -> bool) -> usize
    where
        K: Clone,
    {
        let mut entries = self.lock();
        let doomed: Vec<K> = entries
            .iter()
            .filter_map(|(k, (v, _))| pred(k, v).then(|| k.clone()))
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }
}
