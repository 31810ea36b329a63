// src/lib.rs

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;

// Re-export commonly used types for convenience
pub use config::EngineConfig;
pub use engine::attributes::{AttributeProjection, AttributeStore, ChangeEvent, ChangesCollector, ChangesSink};
pub use engine::binding::{DescriptorMetadata, EntityDescriptor, FieldBinding, HierarchyRules, ViewKind, WidgetType};
pub use engine::filter::{Filter, FilterOperator, FilterParam};
pub use engine::invalidation::{ChangeBatch, ChangeNotification, DispatcherHandle, InvalidationDispatcher};
pub use engine::materializer::{MaterializedPage, Row, RowKind};
pub use engine::query::{Predicate, SecurityScope, SortOrder};
pub use engine::registry::{CreateViewRequest, View, ViewCloseAction, ViewPage, ViewRegistry};
pub use engine::selection::{CancellationToken, OrderedSelection, SelectionPage};
pub use engine::store::{InMemoryRecordStore, RecordStore};
pub use engine::types::{EntityType, Record, RecordKey, RowId, Value, ViewHandle};
pub use error::{EngineError, FilterError, Result};
