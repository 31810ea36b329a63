mod memory;

pub use memory::InMemoryRecordStore;

use crate::engine::query::{CompiledQuery, SortOrder};
use crate::engine::types::{Record, RecordKey};

/// Streaming result of a store query: record keys in query order.
pub type RecordCursor<'a> = Box<dyn Iterator<Item = anyhow::Result<RecordKey>> + Send + 'a>;

/// Generic record persistence consumed by the engine.
///
/// `query` must order by `order` and then by record key (see
/// [`compare_keys`](crate::engine::query::compare_keys)) so equal sort keys
/// always come back in the same sequence.
pub trait RecordStore: Send + Sync {
    fn load(&self, table: &str, key: &str) -> anyhow::Result<Option<Record>>;

    /// Loads the existing subset of `keys`, preserving the requested order.
    fn load_many(&self, table: &str, keys: &[RecordKey]) -> anyhow::Result<Vec<Record>> {
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.load(table, key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn query<'a>(
        &'a self,
        query: &CompiledQuery,
        order: &SortOrder,
    ) -> anyhow::Result<RecordCursor<'a>>;

    /// Runs `query` and loads at most `limit` matching records.
    fn fetch(
        &self,
        query: &CompiledQuery,
        order: &SortOrder,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<Record>> {
        let cursor = self.query(query, order)?;
        let keys = match limit {
            Some(limit) => cursor.take(limit).collect::<anyhow::Result<Vec<_>>>()?,
            None => cursor.collect::<anyhow::Result<Vec<_>>>()?,
        };
        self.load_many(&query.table, &keys)
    }
}
