use crate::engine::filter::{FilterCompiler, FilterDescriptor};
use crate::engine::query::{Predicate, SortOrder};
use crate::engine::types::{EntityType, Path, Record, TableName, Value};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum WidgetType {
    #[default]
    Text,
    Number,
    Quantity,
    Date,
    YesNo,
    Lookup,
    List,
}

pub type ComputedField = Arc<dyn Fn(&Record) -> anyhow::Result<Value> + Send + Sync>;

/// How a field value is produced from its record.
#[derive(Clone)]
pub enum FieldLoader {
    Column(Path),
    Computed(ComputedField),
}

impl fmt::Debug for FieldLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldLoader::Column(path) => write!(f, "Column({})", path.as_str()),
            FieldLoader::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldBinding {
    pub name: SmolStr,
    pub widget: WidgetType,
    pub loader: FieldLoader,
    /// Display-only: a failing loader degrades to a placeholder instead of failing the row.
    pub cosmetic: bool,
}

impl FieldBinding {
    pub fn column(name: &str, widget: WidgetType) -> Self {
        Self {
            name: SmolStr::new(name),
            widget,
            loader: FieldLoader::Column(Path::new(name)),
            cosmetic: false,
        }
    }

    pub fn column_at(name: &str, path: &str, widget: WidgetType) -> Self {
        Self {
            loader: FieldLoader::Column(Path::new(path)),
            ..Self::column(name, widget)
        }
    }

    pub fn computed<F>(name: &str, widget: WidgetType, f: F) -> Self
    where
        F: Fn(&Record) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: SmolStr::new(name),
            widget,
            loader: FieldLoader::Computed(Arc::new(f)),
            cosmetic: false,
        }
    }

    pub fn cosmetic(mut self) -> Self {
        self.cosmetic = true;
        self
    }

    pub fn load(&self, record: &Record) -> anyhow::Result<Value> {
        match &self.loader {
            FieldLoader::Column(path) => Ok(record.resolve(path).cloned().unwrap_or_default()),
            FieldLoader::Computed(f) => f(record),
        }
    }
}

/// Field names and unit codes driving hierarchical (container) expansion.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HierarchyRules {
    pub unit_type_field: SmolStr,
    pub aggregated_field: SmolStr,
    /// Field of an included container pointing at its parent container.
    pub parent_field: SmolStr,
    pub nested_unit: SmolStr,
    pub transport_unit: SmolStr,
    pub virtual_unit: SmolStr,

    pub storage_table: TableName,
    pub storage_container_field: SmolStr,
    pub storage_product_field: SmolStr,
    pub storage_qty_field: SmolStr,
    pub storage_uom_field: SmolStr,

    pub status_field: SmolStr,
    pub reserved_field: SmolStr,
    pub active_field: SmolStr,
    /// Only containers in this status have editable attributes.
    pub editable_status: SmolStr,
    /// Attribute read into the row's best-before date, when set.
    pub best_before_attribute: Option<SmolStr>,
}

impl Default for HierarchyRules {
    fn default() -> Self {
        Self {
            unit_type_field: SmolStr::new("unit_type"),
            aggregated_field: SmolStr::new("aggregated"),
            parent_field: SmolStr::new("parent"),
            nested_unit: SmolStr::new("LU"),
            transport_unit: SmolStr::new("TU"),
            virtual_unit: SmolStr::new("V"),
            storage_table: SmolStr::new("storage"),
            storage_container_field: SmolStr::new("container"),
            storage_product_field: SmolStr::new("product"),
            storage_qty_field: SmolStr::new("qty"),
            storage_uom_field: SmolStr::new("uom"),
            status_field: SmolStr::new("status"),
            reserved_field: SmolStr::new("reserved"),
            active_field: SmolStr::new("active"),
            editable_status: SmolStr::new("planning"),
            best_before_attribute: None,
        }
    }
}

/// Everything the metadata layer declares about one entity type.
#[derive(Clone)]
pub struct EntityDescriptor {
    pub entity_type: EntityType,
    pub table: TableName,
    pub caption: String,
    pub key_field: SmolStr,
    pub fields: Vec<FieldBinding>,
    pub default_order: SortOrder,
    pub filters: Vec<FilterDescriptor>,
    /// Compilers replacing the default one for specific filter ids.
    pub filter_compilers: Vec<(SmolStr, Arc<dyn FilterCompiler>)>,
    pub hierarchy: Option<HierarchyRules>,
    /// Views of this entity go stale on any change to their tables, not only to listed rows.
    pub refresh_on_change: bool,
    /// Further tables whose changes can affect rows of this entity.
    pub dependent_tables: Vec<TableName>,
    /// Always ANDed into the entity's queries.
    pub static_predicate: Predicate,
    pub supports_attributes: bool,
}

impl EntityDescriptor {
    pub fn new(entity_type: impl Into<EntityType>, table: impl Into<TableName>) -> Self {
        let entity_type = entity_type.into();
        Self {
            caption: entity_type.to_string(),
            entity_type,
            table: table.into(),
            key_field: SmolStr::new("id"),
            fields: Vec::new(),
            default_order: SortOrder::default(),
            filters: Vec::new(),
            filter_compilers: Vec::new(),
            hierarchy: None,
            refresh_on_change: false,
            dependent_tables: Vec::new(),
            static_predicate: Predicate::always(),
            supports_attributes: false,
        }
    }

    pub fn field(mut self, field: FieldBinding) -> Self {
        self.fields.push(field);
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.default_order = order;
        self
    }

    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn compiler(mut self, filter_id: &str, compiler: Arc<dyn FilterCompiler>) -> Self {
        self.filter_compilers.push((SmolStr::new(filter_id), compiler));
        self
    }

    pub fn hierarchy(mut self, rules: HierarchyRules) -> Self {
        self.hierarchy = Some(rules);
        self.supports_attributes = true;
        self
    }

    pub fn refresh_on_change(mut self) -> Self {
        self.refresh_on_change = true;
        self
    }

    pub fn depends_on(mut self, table: impl Into<TableName>) -> Self {
        self.dependent_tables.push(table.into());
        self
    }

    pub fn restricted_to(mut self, predicate: Predicate) -> Self {
        self.static_predicate = predicate;
        self
    }
}

/// Source of entity descriptors, injected into the binding factory.
pub trait DescriptorMetadata: Send + Sync {
    fn describe(&self, entity_type: &EntityType) -> anyhow::Result<Option<EntityDescriptor>>;
}

/// Fixed set of descriptors keyed by entity type.
#[derive(Clone, Default)]
pub struct StaticMetadata {
    descriptors: Vec<EntityDescriptor>,
}

impl StaticMetadata {
    pub fn new(descriptors: impl IntoIterator<Item = EntityDescriptor>) -> Self {
        Self {
            descriptors: descriptors.into_iter().collect(),
        }
    }
}

impl DescriptorMetadata for StaticMetadata {
    fn describe(&self, entity_type: &EntityType) -> anyhow::Result<Option<EntityDescriptor>> {
        Ok(self
            .descriptors
            .iter()
            .find(|d| &d.entity_type == entity_type)
            .cloned())
    }
}
