use crate::engine::types::{FastSet, RecordKey, RecordRef, TableName};
use serde::{Deserialize, Serialize};

/// Part of a root document touched by a write.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum ChildScope {
    /// Every record of a child table below the root.
    All { table: TableName },
    Record { table: TableName, key: RecordKey },
}

/// "Record(s) changed" event as emitted by the record store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub root: RecordRef,
    #[serde(default)]
    pub child: Option<ChildScope>,
}

impl ChangeNotification {
    pub fn record(table: impl Into<TableName>, key: impl Into<RecordKey>) -> Self {
        Self {
            root: RecordRef::new(table, key),
            child: None,
        }
    }

    pub fn child_table(root: RecordRef, table: impl Into<TableName>) -> Self {
        Self {
            root,
            child: Some(ChildScope::All {
                table: table.into(),
            }),
        }
    }

    pub fn child_record(
        root: RecordRef,
        table: impl Into<TableName>,
        key: impl Into<RecordKey>,
    ) -> Self {
        Self {
            root,
            child: Some(ChildScope::Record {
                table: table.into(),
                key: key.into(),
            }),
        }
    }
}

/// Notifications collapsed into the minimal set of things to evict.
///
/// - no child scope: the whole root document
/// - all children of a table: the whole child table and the root document
/// - one child record: only that record
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeBatch {
    documents: FastSet<RecordRef>,
    tables: FastSet<TableName>,
    records: FastSet<RecordRef>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(notifications: impl IntoIterator<Item = ChangeNotification>) -> Self {
        let mut batch = Self::new();
        for n in notifications {
            batch.add(n);
        }
        batch
    }

    pub fn add(&mut self, notification: ChangeNotification) {
        match notification.child {
            None => {
                self.documents.insert(notification.root);
            }
            Some(ChildScope::All { table }) => {
                self.tables.insert(table);
                self.documents.insert(notification.root);
            }
            Some(ChildScope::Record { table, key }) => {
                self.records.insert(RecordRef::new(table, key));
            }
        }
    }

    pub fn merge(&mut self, other: ChangeBatch) {
        self.documents.extend(other.documents);
        self.tables.extend(other.tables);
        self.records.extend(other.records);
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.tables.is_empty() && self.records.is_empty()
    }

    pub fn documents(&self) -> impl Iterator<Item = &RecordRef> {
        self.documents.iter()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableName> {
        self.tables.iter()
    }

    pub fn records(&self) -> impl Iterator<Item = &RecordRef> {
        self.records.iter()
    }

    /// Every table with at least one affected record.
    pub fn touched_tables(&self) -> FastSet<TableName> {
        self.documents
            .iter()
            .chain(self.records.iter())
            .map(|r| r.table.clone())
            .chain(self.tables.iter().cloned())
            .collect()
    }

    /// Whether a cached copy of `record` must be dropped.
    pub fn affects(&self, record: &RecordRef) -> bool {
        self.tables.contains(&record.table)
            || self.documents.contains(record)
            || self.records.contains(record)
    }

    /// Keys of `table` named explicitly by this batch.
    pub fn keys_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a RecordKey> + 'a {
        self.documents
            .iter()
            .chain(self.records.iter())
            .filter(move |r| r.table == table)
            .map(|r| &r.key)
    }
}
