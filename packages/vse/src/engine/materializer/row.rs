use super::kind::RowKind;
use crate::engine::types::{RecordRef, RowId, TableName, Value};
use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;

/// Materialized row: a read-only tree node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Row {
    id: RowId,
    kind: RowKind,
    table: TableName,
    fields: IndexMap<SmolStr, Value>,
    processed: bool,
    children: Vec<Row>,
    /// Record whose dynamic attributes this row exposes, if any.
    attributes: Option<RecordRef>,
}

impl Row {
    pub fn builder(id: RowId, kind: RowKind, table: impl Into<TableName>) -> RowBuilder {
        RowBuilder {
            row: Row {
                id,
                kind,
                table: table.into(),
                fields: IndexMap::new(),
                processed: false,
                children: Vec::new(),
                attributes: None,
            },
        }
    }

    pub fn id(&self) -> &RowId {
        &self.id
    }

    pub fn kind(&self) -> RowKind {
        self.kind
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &IndexMap<SmolStr, Value> {
        &self.fields
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn is_top_level(&self) -> bool {
        self.id.is_top_level()
    }

    pub fn children(&self) -> &[Row] {
        &self.children
    }

    pub fn has_attributes(&self) -> bool {
        self.attributes.is_some()
    }

    pub fn attributes_record(&self) -> Option<&RecordRef> {
        self.attributes.as_ref()
    }

    /// Finds this row or a descendant by id.
    pub fn find(&self, id: &RowId) -> Option<&Row> {
        self.stream_recursive().find(|row| &row.id == id)
    }

    /// Depth-first, pre-order walk over this row and its descendants.
    pub fn stream_recursive(&self) -> RowIter<'_> {
        RowIter { stack: vec![self] }
    }

    /// New row with the requested changes applied; `self` is left as is.
    pub fn with_changes(&self, changes: RowChangeRequest) -> Row {
        let mut row = self.clone();
        for (name, value) in changes.fields {
            row.fields.insert(name, value);
        }
        if let Some(processed) = changes.processed {
            row.processed = processed;
        }
        row
    }
}

pub struct RowIter<'a> {
    stack: Vec<&'a Row>,
}

impl<'a> Iterator for RowIter<'a> {
    type Item = &'a Row;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.stack.pop()?;
        self.stack.extend(row.children.iter().rev());
        Some(row)
    }
}

/// Accumulates a row's parts; the row becomes visible only through [`build`](RowBuilder::build).
pub struct RowBuilder {
    row: Row,
}

impl RowBuilder {
    pub fn field(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.row.fields.insert(name.into(), value.into());
        self
    }

    pub fn set_field(&mut self, name: impl Into<SmolStr>, value: impl Into<Value>) {
        self.row.fields.insert(name.into(), value.into());
    }

    pub fn processed(mut self, processed: bool) -> Self {
        self.row.processed = processed;
        self
    }

    pub fn children(mut self, children: Vec<Row>) -> Self {
        self.row.children = children;
        self
    }

    pub fn attributes(mut self, record: Option<RecordRef>) -> Self {
        self.row.attributes = record;
        self
    }

    pub fn build(self) -> Row {
        self.row
    }
}

/// Field overrides for [`Row::with_changes`].
#[derive(Clone, Debug, Default)]
pub struct RowChangeRequest {
    pub fields: IndexMap<SmolStr, Value>,
    pub processed: Option<bool>,
}

impl RowChangeRequest {
    pub fn set(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn processed(mut self, processed: bool) -> Self {
        self.processed = Some(processed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Row {
        let leaf = |product: &str| {
            Row::builder(RowId::storage("1", "2", product), RowKind::StorageLeaf, "storage")
                .field("product", product)
                .build()
        };
        let tu = Row::builder(RowId::nested(Some(&"1".into()), "2"), RowKind::TransportContainer, "container")
            .children(vec![leaf("P1"), leaf("P2")])
            .build();
        Row::builder(RowId::record("1"), RowKind::NestedContainer, "container")
            .field("code", "LU-1")
            .children(vec![tu])
            .build()
    }

    #[test]
    fn test_stream_is_pre_order() {
        let ids: Vec<String> = tree().stream_recursive().map(|r| r.id().encode().to_string()).collect();
        assert_eq!(ids, vec!["1", "1/2", "1/2/P1", "1/2/P2"]);
    }

    #[test]
    fn test_find_nested() {
        let root = tree();
        let found = root.find(&RowId::storage("1", "2", "P2")).unwrap();
        assert_eq!(found.field("product"), Some(&Value::str("P2")));
        assert!(!found.is_top_level());
        assert!(root.find(&RowId::record("9")).is_none());
    }

    #[test]
    fn test_with_changes_leaves_original_untouched() {
        let root = tree();
        let changed = root.with_changes(RowChangeRequest::default().set("code", "LU-9").processed(true));
        assert_eq!(root.field("code"), Some(&Value::str("LU-1")));
        assert!(!root.is_processed());
        assert_eq!(changed.field("code"), Some(&Value::str("LU-9")));
        assert!(changed.is_processed());
        assert_eq!(changed.children().len(), 1);
    }
}
