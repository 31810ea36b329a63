use super::descriptor::WidgetType;
use super::view_binding::ViewBinding;
use crate::engine::filter::FilterDescriptor;
use crate::engine::types::EntityType;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    #[default]
    Grid,
    /// Embedded below a parent view row; display-only columns are left out.
    Included,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LayoutElement {
    pub field: SmolStr,
    pub widget: WidgetType,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ViewLayout {
    pub entity_type: EntityType,
    pub kind: ViewKind,
    pub caption: String,
    pub id_field: SmolStr,
    pub elements: Vec<LayoutElement>,
    pub filters: Vec<FilterDescriptor>,
    pub supports_tree: bool,
    pub supports_attributes: bool,
}

impl ViewLayout {
    pub fn compute(binding: &ViewBinding, kind: ViewKind) -> Self {
        let elements = binding
            .fields
            .iter()
            .filter(|f| kind == ViewKind::Grid || !f.cosmetic)
            .map(|f| LayoutElement {
                field: f.name.clone(),
                widget: f.widget,
            })
            .collect();
        let filters = match kind {
            ViewKind::Grid => binding.filters.clone(),
            ViewKind::Included => Vec::new(),
        };
        Self {
            entity_type: binding.entity_type.clone(),
            kind,
            caption: binding.caption.clone(),
            id_field: binding.key_field.clone(),
            elements,
            filters,
            supports_tree: binding.hierarchy.is_some(),
            supports_attributes: binding.supports_attributes,
        }
    }
}
