use super::bounded::BoundedCache;
use crate::engine::invalidation::{ChangeBatch, InvalidationListener};
use crate::engine::store::RecordStore;
use crate::engine::types::{Record, RecordRef};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Read-through cache of loaded records, evicted by change batches.
///
/// Every eviction bumps `generation` before touching the entries. A load only
/// fills the cache when no eviction started since it began reading the store.
pub struct RecordCache {
    inner: BoundedCache<RecordRef, Arc<Record>>,
    generation: AtomicU64,
}

impl RecordCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            inner: BoundedCache::new(capacity, ttl),
            generation: AtomicU64::new(0),
        }
    }

    /// Missing records are not cached, so a later insert becomes visible.
    pub fn load(
        &self,
        store: &dyn RecordStore,
        table: &str,
        key: &str,
    ) -> anyhow::Result<Option<Arc<Record>>> {
        let reference = RecordRef::new(table, key);
        if let Some(record) = self.inner.get(&reference) {
            return Ok(Some(record));
        }
        let generation = self.generation.load(Ordering::Acquire);
        match store.load(table, key)? {
            Some(record) => {
                let record = Arc::new(record);
                let cached = self.inner.put_if(reference, record.clone(), || {
                    self.generation.load(Ordering::Acquire) == generation
                });
                if !cached {
                    trace!(table, key, "record changed while loading; not cached");
                }
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn put(&self, record: Record) {
        self.inner.put(record.reference(), Arc::new(record));
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn evict(&self, reference: &RecordRef) -> bool {
        self.bump();
        self.inner.invalidate(reference)
    }

    pub fn evict_table(&self, table: &str) -> usize {
        self.bump();
        self.inner.invalidate_where(|r, _| r.table == table)
    }

    pub fn clear(&self) {
        self.bump();
        self.inner.invalidate_all();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl InvalidationListener for RecordCache {
    fn name(&self) -> &str {
        "record-cache"
    }

    fn on_batch(&self, batch: &ChangeBatch) -> anyhow::Result<usize> {
        self.bump();
        Ok(self.inner.invalidate_where(|r, _| batch.affects(r)))
    }
}
