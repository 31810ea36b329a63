use super::kind::RowKind;
use super::row::{Row, RowBuilder};
use crate::engine::attributes::AttributeStore;
use crate::engine::binding::{HierarchyRules, ViewBinding};
use crate::engine::cache::RecordCache;
use crate::engine::query::{CompiledQuery, Predicate, SortOrder};
use crate::engine::store::RecordStore;
use crate::engine::types::{FastSet, Record, RecordKey, RecordRef, RowId, Value};
use crate::error::{EngineError, Result};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shown in place of a cosmetic value that could not be computed.
pub const PLACEHOLDER: &str = "?";

pub const STATUS_DISPLAY_FIELD: &str = "status_display";
pub const BEST_BEFORE_FIELD: &str = "best_before";
pub const PRODUCT_FIELD: &str = "product";
pub const UOM_FIELD: &str = "uom";
pub const QTY_FIELD: &str = "qty";

const RESERVED: &str = "Reserved";

pub type RowProcessedPredicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Per-request switches for row expansion.
#[derive(Clone)]
pub struct ExpansionContext {
    pub include_attributes: bool,
    /// Rows matching this predicate are flagged processed; none are by default.
    pub processed: Option<RowProcessedPredicate>,
}

impl Default for ExpansionContext {
    fn default() -> Self {
        Self {
            include_attributes: true,
            processed: None,
        }
    }
}

impl ExpansionContext {
    pub fn with_processed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.processed = Some(Arc::new(f));
        self
    }

    fn is_processed(&self, record: &Record) -> bool {
        self.processed.as_ref().is_some_and(|f| f(record))
    }
}

impl fmt::Debug for ExpansionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpansionContext")
            .field("include_attributes", &self.include_attributes)
            .field("processed", &self.processed.is_some())
            .finish()
    }
}

/// A requested row that could not be built. Other rows of the page are unaffected.
#[derive(Debug)]
pub struct RowFailure {
    pub row_id: RowId,
    pub error: EngineError,
}

#[derive(Debug, Default)]
pub struct MaterializedPage {
    /// Successfully built rows in request order.
    pub rows: Vec<Row>,
    pub failures: Vec<RowFailure>,
}

impl MaterializedPage {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn row(&self, id: &RowId) -> Option<&Row> {
        self.rows.iter().find(|r| r.id() == id)
    }
}

/// Summed storage of one product.
#[derive(Clone, Debug)]
struct ProductLine {
    product: RecordKey,
    uom: Value,
    qty: f64,
}

type Content = IndexMap<RecordKey, ProductLine>;

fn merge(into: &mut Content, lines: impl IntoIterator<Item = ProductLine>) {
    for line in lines {
        into.entry(line.product.clone())
            .and_modify(|existing| existing.qty += line.qty)
            .or_insert(line);
    }
}

/// A built row plus the product content it covers.
struct Node {
    row: Row,
    content: Content,
}

/// Turns row ids of one view into row trees.
pub struct RowMaterializer<'a> {
    binding: &'a ViewBinding,
    store: &'a dyn RecordStore,
    records: &'a RecordCache,
    attributes: Option<&'a dyn AttributeStore>,
    ctx: &'a ExpansionContext,
}

impl<'a> RowMaterializer<'a> {
    pub fn new(
        binding: &'a ViewBinding,
        store: &'a dyn RecordStore,
        records: &'a RecordCache,
        attributes: Option<&'a dyn AttributeStore>,
        ctx: &'a ExpansionContext,
    ) -> Self {
        Self {
            binding,
            store,
            records,
            attributes,
            ctx,
        }
    }

    /// Builds every requested row; each failure is confined to its own row.
    pub fn materialize(&self, ids: &[RowId]) -> MaterializedPage {
        #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
        let results: Vec<(RowId, Result<Row>)> = {
            use rayon::prelude::*;
            ids.par_iter()
                .map(|id| (id.clone(), self.materialize_one(id)))
                .collect()
        };

        #[cfg(any(target_arch = "wasm32", not(feature = "parallel")))]
        let results: Vec<(RowId, Result<Row>)> = ids
            .iter()
            .map(|id| (id.clone(), self.materialize_one(id)))
            .collect();

        let mut page = MaterializedPage::default();
        for (row_id, result) in results {
            match result {
                Ok(row) => page.rows.push(row),
                Err(error) => {
                    if matches!(error, EngineError::UnknownRowKind { .. }) {
                        error!(entity_type = %self.binding.entity_type, row = %row_id, %error, "row kind not recognized");
                    } else {
                        warn!(entity_type = %self.binding.entity_type, row = %row_id, %error, "row failed to materialize");
                    }
                    page.failures.push(RowFailure { row_id, error });
                }
            }
        }
        debug!(
            entity_type = %self.binding.entity_type,
            rows = page.rows.len(),
            failures = page.failures.len(),
            "page materialized"
        );
        page
    }

    /// Non-root ids are resolved by building their top level row and searching its tree.
    pub fn materialize_one(&self, id: &RowId) -> Result<Row> {
        let root = self.build_root(id.top_level_key())?;
        if id.is_top_level() {
            return Ok(root);
        }
        root.find(id)
            .cloned()
            .ok_or_else(|| EngineError::RecordNotFound(id.to_string()))
    }

    fn build_root(&self, key: &RecordKey) -> Result<Row> {
        let record = self
            .records
            .load(self.store, &self.binding.table, key)
            .map_err(EngineError::store)?
            .ok_or_else(|| EngineError::RecordNotFound(RecordRef::new(self.binding.table.clone(), key.clone()).to_string()))?;
        let mut visited = FastSet::default();
        Ok(self.build_node(&record, &record.key, &mut visited)?.row)
    }

    fn build_node(&self, record: &Record, top: &RecordKey, visited: &mut FastSet<RecordKey>) -> Result<Node> {
        visited.insert(record.key.clone());
        let rules = self.binding.hierarchy.as_ref();
        let kind = RowKind::classify(record, rules)?;
        let processed = self.ctx.is_processed(record);

        let mut builder = Row::builder(RowId::nested(Some(top), record.key.clone()), kind, record.table.clone())
            .processed(processed)
            .attributes(self.attribute_source(record.reference()));
        self.project_fields(&mut builder, record)?;

        let Some(rules) = rules else {
            return Ok(Node {
                row: builder.build(),
                content: Content::new(),
            });
        };

        let mut content = Content::new();
        let children = match kind {
            RowKind::Plain | RowKind::StorageLeaf => Vec::new(),
            RowKind::VirtualContainer => {
                merge(&mut content, self.storage_lines(rules, &record.key)?);
                Vec::new()
            }
            RowKind::AggregateContainer => {
                let lines = self.storage_lines(rules, &record.key)?;
                merge(&mut content, lines.iter().cloned());
                // a container's own storage has no attributes of its own
                self.storage_leaves(rules, top, &record.key, &lines, processed, None)
            }
            RowKind::NestedContainer => {
                let mut children = Vec::new();
                for included in self.included(rules, &record.key)? {
                    if visited.contains(&included.key) {
                        warn!(record = %included.reference(), "container cycle skipped");
                        continue;
                    }
                    let child = self.build_node(&included, top, visited)?;
                    merge(&mut content, child.content.into_values());
                    children.push(child.row);
                }
                children
            }
            RowKind::TransportContainer => {
                let mut children = Vec::new();
                for included in self.included(rules, &record.key)? {
                    let lines = self.storage_lines(rules, &included.key)?;
                    let source = self.attribute_source(included.reference());
                    children.extend(self.storage_leaves(rules, top, &included.key, &lines, processed, source));
                    merge(&mut content, lines);
                }
                children
            }
        };

        self.project_container_fields(&mut builder, rules, record, &content);
        Ok(Node {
            row: builder.children(children).build(),
            content,
        })
    }

    fn attribute_source(&self, record: RecordRef) -> Option<RecordRef> {
        (self.ctx.include_attributes && self.binding.supports_attributes && self.attributes.is_some())
            .then_some(record)
    }

    /// Cosmetic fields degrade to a placeholder; any other failing field fails the row.
    fn project_fields(&self, builder: &mut RowBuilder, record: &Record) -> Result<()> {
        for field in &self.binding.fields {
            match field.load(record) {
                Ok(value) => builder.set_field(field.name.clone(), value),
                Err(err) if field.cosmetic => {
                    warn!(record = %record.reference(), field = %field.name, error = %err, "cosmetic field failed");
                    builder.set_field(field.name.clone(), PLACEHOLDER);
                }
                Err(err) => {
                    return Err(EngineError::store(err.context(format!(
                        "field '{}' of {}",
                        field.name,
                        record.reference()
                    ))))
                }
            }
        }
        Ok(())
    }

    fn project_container_fields(&self, builder: &mut RowBuilder, rules: &HierarchyRules, record: &Record, content: &Content) {
        let status = if record.get_bool(&rules.reserved_field).unwrap_or(false) {
            Value::str(RESERVED)
        } else {
            record.get(&rules.status_field).cloned().unwrap_or_default()
        };
        builder.set_field(STATUS_DISPLAY_FIELD, status);

        match content.values().next() {
            Some(line) if content.len() == 1 => {
                builder.set_field(PRODUCT_FIELD, Value::Str(line.product.clone()));
                builder.set_field(UOM_FIELD, line.uom.clone());
                builder.set_field(QTY_FIELD, line.qty);
            }
            _ => {
                builder.set_field(PRODUCT_FIELD, Value::Null);
                builder.set_field(UOM_FIELD, Value::Null);
                builder.set_field(QTY_FIELD, Value::Null);
            }
        }

        if let (Some(attribute), Some(store)) = (&rules.best_before_attribute, self.attributes) {
            let value = match store.get_value(&record.reference(), attribute) {
                Ok(value) => value.unwrap_or_default(),
                Err(err) => {
                    warn!(record = %record.reference(), error = %err, "best before date unavailable");
                    Value::str(PLACEHOLDER)
                }
            };
            builder.set_field(BEST_BEFORE_FIELD, value);
        }
    }

    /// Containers whose parent field points at `key`.
    fn included(&self, rules: &HierarchyRules, key: &RecordKey) -> Result<Vec<Record>> {
        let query = CompiledQuery::new(self.binding.table.clone()).and(Predicate::eq(&rules.parent_field, key.as_str()));
        self.store
            .fetch(&query, &self.binding.default_order, None)
            .map_err(EngineError::store)
    }

    /// Storage of one container summed per product, in product order.
    fn storage_lines(&self, rules: &HierarchyRules, container: &RecordKey) -> Result<Vec<ProductLine>> {
        let query = CompiledQuery::new(rules.storage_table.clone())
            .and(Predicate::eq(&rules.storage_container_field, container.as_str()));
        let records = self
            .store
            .fetch(&query, &SortOrder::by(&rules.storage_product_field), None)
            .map_err(EngineError::store)?;

        let mut content = Content::new();
        merge(
            &mut content,
            records.iter().filter_map(|storage| {
                let product = storage.get_key(&rules.storage_product_field)?;
                Some(ProductLine {
                    product,
                    uom: storage.get(&rules.storage_uom_field).cloned().unwrap_or_default(),
                    qty: storage
                        .get(&rules.storage_qty_field)
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0),
                })
            }),
        );
        Ok(content.into_values().collect())
    }

    fn storage_leaves(
        &self,
        rules: &HierarchyRules,
        top: &RecordKey,
        container: &RecordKey,
        lines: &[ProductLine],
        processed: bool,
        attributes: Option<RecordRef>,
    ) -> Vec<Row> {
        lines
            .iter()
            .map(|line| {
                Row::builder(
                    RowId::storage(top.clone(), container.clone(), line.product.clone()),
                    RowKind::StorageLeaf,
                    rules.storage_table.clone(),
                )
                .field(PRODUCT_FIELD, Value::Str(line.product.clone()))
                .field(UOM_FIELD, line.uom.clone())
                .field(QTY_FIELD, line.qty)
                .processed(processed)
                .attributes(attributes.clone())
                .build()
            })
            .collect()
    }
}
