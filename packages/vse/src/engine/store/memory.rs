use super::{RecordCursor, RecordStore};
use crate::engine::invalidation::{ChangeNotification, DispatcherHandle, UnitOfWork};
use crate::engine::query::{CompiledQuery, SortOrder};
use crate::engine::types::{FastMap, Record, RecordKey, RecordRef, TableName};
use anyhow::bail;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

type Table = FastMap<RecordKey, Record>;

/// Reference record store backed by per-table hash maps.
///
/// Writes emit change notifications to an attached dispatcher, either
/// immediately or through a caller's [`UnitOfWork`].
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<FastMap<TableName, Table>>,
    queries: AtomicUsize,
    failure: Mutex<Option<String>>,
    dispatcher: RwLock<Option<DispatcherHandle>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn attach_dispatcher(&self, handle: DispatcherHandle) {
        *self.dispatcher.write().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Every write is a single map operation; a poisoned lock still guards
    /// consistent tables.
    fn read_tables(&self) -> RwLockReadGuard<'_, FastMap<TableName, Table>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, FastMap<TableName, Table>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Silent write: no notification.
    pub fn insert(&self, record: Record) {
        self.write_tables()
            .entry(record.table.clone())
            .or_default()
            .insert(record.key.clone(), record);
    }

    pub fn upsert(&self, record: Record) {
        let notification = ChangeNotification::record(record.table.clone(), record.key.clone());
        self.insert(record);
        self.emit(notification);
    }

    /// Writes a record that belongs to the document rooted at `root`.
    pub fn upsert_child(&self, root: RecordRef, record: Record) {
        let notification = ChangeNotification::child_record(root, record.table.clone(), record.key.clone());
        self.insert(record);
        self.emit(notification);
    }

    /// Writes inside a unit of work; the notification waits for its commit.
    pub fn upsert_in(&self, uow: &mut UnitOfWork, record: Record) {
        uow.collect(ChangeNotification::record(record.table.clone(), record.key.clone()));
        self.insert(record);
    }

    pub fn delete(&self, table: &str, key: &str) -> bool {
        let removed = self
            .write_tables()
            .get_mut(table)
            .and_then(|t| t.remove(key))
            .is_some();
        if removed {
            self.emit(ChangeNotification::record(table, key));
        }
        removed
    }

    /// Makes every following query fail with `message` until cleared.
    pub fn fail_queries_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Number of queries executed so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn len(&self, table: &str) -> usize {
        self.read_tables().get(table).map_or(0, |t| t.len())
    }

    fn emit(&self, notification: ChangeNotification) {
        let slot = self.dispatcher.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.as_ref() {
            handle.notify(notification);
        }
    }
}

impl RecordStore for InMemoryRecordStore {
    fn load(&self, table: &str, key: &str) -> anyhow::Result<Option<Record>> {
        let tables = self.read_tables();
        Ok(tables.get(table).and_then(|t| t.get(key)).cloned())
    }

    fn query<'a>(
        &'a self,
        query: &CompiledQuery,
        order: &SortOrder,
    ) -> anyhow::Result<RecordCursor<'a>> {
        if let Some(message) = self.failure.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            bail!(message);
        }
        self.queries.fetch_add(1, Ordering::Relaxed);

        let tables = self.read_tables();
        let Some(table) = tables.get(&query.table) else {
            return Ok(Box::new(std::iter::empty()));
        };

        let mut matched: Vec<&Record> = table
            .values()
            .filter(|r| query.predicate.matches(r, &query.params))
            .collect();
        matched.sort_by(|a, b| order.compare(a, b));
        trace!(table = %query.table, matched = matched.len(), "query executed");

        let keys: Vec<RecordKey> = matched.into_iter().map(|r| r.key.clone()).collect();
        Ok(Box::new(keys.into_iter().map(Ok::<_, anyhow::Error>)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::query::Predicate;
    use crate::engine::types::Value;
    use serde_json::json;

    fn store() -> InMemoryRecordStore {
        InMemoryRecordStore::with_records([
            Record::new("container", "1", Value::from(json!({"name": "B", "status": "A"}))),
            Record::new("container", "2", Value::from(json!({"name": "A", "status": "A"}))),
            Record::new("container", "3", Value::from(json!({"name": "C", "status": "D"}))),
        ])
    }

    #[test]
    fn test_query_filters_and_sorts() {
        let store = store();
        let query = CompiledQuery::new("container").and(Predicate::eq("status", "A"));
        let keys: Vec<_> = store
            .query(&query, &SortOrder::by("name"))
            .unwrap()
            .collect::<anyhow::Result<_>>()
            .unwrap();
        assert_eq!(keys, vec!["2", "1"]);
        assert_eq!(store.query_count(), 1);
    }

    #[test]
    fn test_unknown_table_is_empty() {
        let store = store();
        let mut cursor = store.query(&CompiledQuery::new("nope"), &SortOrder::default()).unwrap();
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_fetch_respects_limit() {
        let store = store();
        let records = store
            .fetch(&CompiledQuery::new("container"), &SortOrder::by("name"), Some(2))
            .unwrap();
        let names: Vec<_> = records.iter().filter_map(|r| r.get_str("name")).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_injected_failure() {
        let store = store();
        store.fail_queries_with("disk on fire");
        let err = store
            .query(&CompiledQuery::new("container"), &SortOrder::default())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "disk on fire");
        store.clear_failure();
        assert!(store.query(&CompiledQuery::new("container"), &SortOrder::default()).is_ok());
    }

    #[test]
    fn test_delete() {
        let store = store();
        assert!(store.delete("container", "1"));
        assert!(!store.delete("container", "1"));
        assert_eq!(store.len("container"), 2);
        assert!(store.load("container", "1").unwrap().is_none());
    }

    #[test]
    fn test_writes_land_after_a_panicking_writer() {
        let store = store();
        let panicked = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _tables = store.tables.write().unwrap();
                    panic!("writer died holding the lock");
                })
                .join()
                .is_err()
        });
        assert!(panicked);
        assert!(store.tables.is_poisoned());

        store.insert(Record::new("container", "4", Value::from(json!({"name": "D"}))));
        assert_eq!(store.len("container"), 4);
        assert!(store.delete("container", "1"));
        assert!(store.load("container", "1").unwrap().is_none());
        assert_eq!(store.load("container", "4").unwrap().unwrap().get_str("name"), Some("D"));
    }
}
