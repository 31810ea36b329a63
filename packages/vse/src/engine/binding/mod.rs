pub mod descriptor;
pub mod factory;
pub mod layout;
pub mod view_binding;

pub use descriptor::{
    ComputedField, DescriptorMetadata, EntityDescriptor, FieldBinding, FieldLoader, HierarchyRules,
    StaticMetadata, WidgetType,
};
pub use factory::BindingFactory;
pub use layout::{LayoutElement, ViewKind, ViewLayout};
pub use view_binding::ViewBinding;
