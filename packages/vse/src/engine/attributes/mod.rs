pub mod changes;
pub mod projection;
pub mod store;

pub use changes::{ChangeEvent, ChangesCollector, ChangesSink};
pub use projection::{AttributeProjection, ProjectionRules};
pub use store::{AttributeDefinition, AttributeStore, InMemoryAttributeStore};
