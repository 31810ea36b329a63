use super::descriptor::{EntityDescriptor, FieldBinding, HierarchyRules};
use crate::engine::filter::{
    compile_filters, CompileContext, DefaultFilterCompiler, Filter, FilterCompiler, FilterDescriptor,
    IdsFilterCompiler, IDS_FILTER_ID,
};
use crate::engine::query::{CompiledQuery, Predicate, SortOrder};
use crate::engine::types::{EntityType, FastMap, FastSet, TableName};
use crate::error::FilterError;
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;

/// Immutable per-entity-type binding: where rows come from, which fields they
/// carry, and how filters compile against them.
pub struct ViewBinding {
    pub entity_type: EntityType,
    pub table: TableName,
    pub caption: String,
    pub key_field: SmolStr,
    pub fields: Vec<FieldBinding>,
    pub default_order: SortOrder,
    pub filters: Vec<FilterDescriptor>,
    pub hierarchy: Option<HierarchyRules>,
    pub refresh_on_change: bool,
    pub supports_attributes: bool,
    pub static_predicate: Predicate,
    dependent_tables: FastSet<TableName>,
    compilers: FastMap<SmolStr, Arc<dyn FilterCompiler>>,
}

impl ViewBinding {
    pub fn from_descriptor(descriptor: EntityDescriptor) -> Self {
        let mut compilers: FastMap<SmolStr, Arc<dyn FilterCompiler>> = FastMap::default();
        let default: Arc<dyn FilterCompiler> = Arc::new(DefaultFilterCompiler);
        for filter in &descriptor.filters {
            compilers.insert(filter.filter_id.clone(), default.clone());
        }
        compilers.insert(SmolStr::new(IDS_FILTER_ID), Arc::new(IdsFilterCompiler));
        for (filter_id, compiler) in descriptor.filter_compilers {
            compilers.insert(filter_id, compiler);
        }

        let mut dependent_tables: FastSet<TableName> = descriptor.dependent_tables.into_iter().collect();
        if let Some(rules) = &descriptor.hierarchy {
            dependent_tables.insert(rules.storage_table.clone());
        }

        Self {
            entity_type: descriptor.entity_type,
            table: descriptor.table,
            caption: descriptor.caption,
            key_field: descriptor.key_field,
            fields: descriptor.fields,
            default_order: descriptor.default_order,
            filters: descriptor.filters,
            hierarchy: descriptor.hierarchy,
            refresh_on_change: descriptor.refresh_on_change,
            supports_attributes: descriptor.supports_attributes,
            static_predicate: descriptor.static_predicate,
            dependent_tables,
            compilers,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldBinding> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn filter_descriptor(&self, filter_id: &str) -> Option<&FilterDescriptor> {
        self.filters.iter().find(|f| f.filter_id == filter_id)
    }

    pub fn compiler(&self, filter_id: &str) -> Option<&Arc<dyn FilterCompiler>> {
        self.compilers.get(filter_id)
    }

    pub fn supports_filter(&self, filter_id: &str) -> bool {
        self.compilers.contains_key(filter_id)
    }

    pub fn compile(&self, filters: &[Filter], ctx: &CompileContext<'_>) -> Result<CompiledQuery, FilterError> {
        compile_filters(self, filters, ctx)
    }

    /// Filters applied when a view is opened without explicit ones.
    pub fn auto_filters(&self, ctx: &CompileContext<'_>) -> Vec<Filter> {
        self.filters.iter().filter_map(|d| d.auto_filter(ctx)).collect()
    }

    /// Tables whose changes may affect this binding's rows.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &TableName> {
        std::iter::once(&self.table).chain(self.dependent_tables.iter())
    }

    pub fn references_table(&self, table: &str) -> bool {
        self.table == table || self.dependent_tables.contains(table)
    }
}

impl fmt::Debug for ViewBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewBinding")
            .field("entity_type", &self.entity_type)
            .field("table", &self.table)
            .field("fields", &self.fields.len())
            .field("filters", &self.compilers.len())
            .field("hierarchy", &self.hierarchy.is_some())
            .finish()
    }
}
