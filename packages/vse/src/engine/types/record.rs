use super::keys::{RecordKey, RecordRef, TableName};
use super::path::Path;
use super::value::Value;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A business record as returned by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub table: TableName,
    pub key: RecordKey,
    /// Field object; non-object payloads are wrapped by the store.
    pub fields: Value,
}

impl Record {
    pub fn new(table: impl Into<TableName>, key: impl Into<RecordKey>, fields: Value) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            fields,
        }
    }

    pub fn reference(&self) -> RecordRef {
        RecordRef::new(self.table.clone(), self.key.clone())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn resolve(&self, path: &Path) -> Option<&Value> {
        path.resolve(&self.fields)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Reads a key-like field (string or integral number) as a record key.
    pub fn get_key(&self, field: &str) -> Option<RecordKey> {
        match self.get(field)? {
            Value::Str(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(SmolStr::new(format!("{}", *n as i64))),
            _ => None,
        }
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }
}
