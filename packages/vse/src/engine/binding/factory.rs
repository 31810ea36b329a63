use super::descriptor::DescriptorMetadata;
use super::layout::{ViewKind, ViewLayout};
use super::view_binding::ViewBinding;
use crate::engine::cache::BoundedCache;
use crate::engine::types::EntityType;
use crate::error::{EngineError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Builds bindings from injected metadata and caches them per entity type.
///
/// Bindings stay cached until [`clear`](BindingFactory::clear); computed
/// layouts live in a bounded LRU.
pub struct BindingFactory {
    metadata: Arc<dyn DescriptorMetadata>,
    bindings: DashMap<EntityType, Arc<ViewBinding>>,
    layouts: BoundedCache<(EntityType, ViewKind), Arc<ViewLayout>>,
}

impl BindingFactory {
    pub fn new(metadata: Arc<dyn DescriptorMetadata>, layout_capacity: usize) -> Self {
        Self {
            metadata,
            bindings: DashMap::new(),
            layouts: BoundedCache::new(layout_capacity, None),
        }
    }

    #[instrument(skip_all, fields(entity_type = %entity_type))]
    pub fn get(&self, entity_type: &EntityType) -> Result<Arc<ViewBinding>> {
        if let Some(binding) = self.bindings.get(entity_type) {
            return Ok(binding.clone());
        }

        let descriptor = self
            .metadata
            .describe(entity_type)
            .map_err(EngineError::store)?
            .ok_or_else(|| EngineError::UnknownEntityType(entity_type.to_string()))?;
        let binding = Arc::new(ViewBinding::from_descriptor(descriptor));
        debug!("Built view binding: {:?}", binding);

        // A concurrent builder may have won; keep whichever landed first.
        Ok(self
            .bindings
            .entry(entity_type.clone())
            .or_insert(binding)
            .clone())
    }

    pub fn layout(&self, entity_type: &EntityType, kind: ViewKind) -> Result<Arc<ViewLayout>> {
        self.layouts.get_or_load((entity_type.clone(), kind), || {
            let binding = self.get(entity_type)?;
            Ok(Arc::new(ViewLayout::compute(&binding, kind)))
        })
    }

    pub fn cached_bindings(&self) -> usize {
        self.bindings.len()
    }

    pub fn cached_layouts(&self) -> usize {
        self.layouts.len()
    }

    pub fn clear(&self) {
        self.bindings.clear();
        self.layouts.invalidate_all();
    }
}
