use super::view::{View, ViewCloseAction, ViewState};
use crate::config::EngineConfig;
use crate::engine::attributes::{AttributeProjection, AttributeStore, ProjectionRules};
use crate::engine::binding::{BindingFactory, DescriptorMetadata, ViewBinding, ViewKind, ViewLayout};
use crate::engine::cache::RecordCache;
use crate::engine::filter::{CompileContext, Filter, IdsFilterData, IDS_FILTER_ID};
use crate::engine::invalidation::{ChangeBatch, InvalidationListener};
use crate::engine::materializer::{ExpansionContext, MaterializedPage, RowMaterializer};
use crate::engine::query::{CompiledQuery, SecurityScope, SortOrder};
use crate::engine::selection::{CancellationToken, OrderedSelection, SelectionPage, SelectionStore};
use crate::engine::store::RecordStore;
use crate::engine::types::{EntityType, FastSet, RecordKey, RowId, TableName, ViewHandle};
use crate::error::{EngineError, FilterError, Result};
use chrono::NaiveDate;
use dashmap::DashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Parameters of a new view.
#[derive(Clone, Debug)]
pub struct CreateViewRequest {
    pub entity_type: EntityType,
    pub kind: ViewKind,
    /// Regular filters. When empty (and no id restriction is given) the
    /// binding's auto filters apply.
    pub filters: Vec<Filter>,
    /// Filters the user cannot remove through [`ViewRegistry::filter`].
    pub sticky_filters: Vec<Filter>,
    /// Defaults to the binding's order.
    pub order: Option<SortOrder>,
    /// Shortcut for a sticky "only these records" filter.
    pub filter_only_ids: Option<Vec<RecordKey>>,
    pub parent: Option<ViewHandle>,
    pub scope: SecurityScope,
}

impl CreateViewRequest {
    pub fn new(entity_type: impl Into<EntityType>, scope: SecurityScope) -> Self {
        Self {
            entity_type: entity_type.into(),
            kind: ViewKind::Grid,
            filters: Vec::new(),
            sticky_filters: Vec::new(),
            order: None,
            filter_only_ids: None,
            parent: None,
            scope,
        }
    }

    pub fn kind(mut self, kind: ViewKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sticky(mut self, filter: Filter) -> Self {
        self.sticky_filters.push(filter);
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn only_ids(mut self, keys: impl IntoIterator<Item = impl Into<RecordKey>>) -> Self {
        self.filter_only_ids = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn parent(mut self, parent: ViewHandle) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// One page of a view: ids from the selection plus their materialized rows.
#[derive(Debug)]
pub struct ViewPage {
    pub handle: ViewHandle,
    pub selection: OrderedSelection,
    pub page: SelectionPage,
    pub rows: MaterializedPage,
}

impl ViewPage {
    pub fn row_ids(&self) -> &[RowId] {
        &self.page.row_ids
    }

    /// Total number of rows in the selection the page was cut from.
    pub fn total(&self) -> usize {
        self.selection.len()
    }
}

/// Process-wide map of live views.
///
/// Views are session-scoped caches: nothing here is persisted.
pub struct ViewRegistry {
    store: Arc<dyn RecordStore>,
    bindings: BindingFactory,
    selections: SelectionStore,
    records: Arc<RecordCache>,
    attributes: Option<Arc<dyn AttributeStore>>,
    expansion: ExpansionContext,
    typeahead_limit: usize,
    today: Option<NaiveDate>,
    views: DashMap<ViewHandle, Arc<View>>,
    projections: DashMap<(ViewHandle, RowId), Arc<AttributeProjection>>,
}

impl ViewRegistry {
    pub fn new(store: Arc<dyn RecordStore>, metadata: Arc<dyn DescriptorMetadata>, config: &EngineConfig) -> Self {
        Self {
            selections: SelectionStore::new(store.clone(), config),
            bindings: BindingFactory::new(metadata, config.layout_cache_capacity),
            records: Arc::new(RecordCache::new(config.record_cache_capacity, config.record_cache_ttl())),
            store,
            attributes: None,
            expansion: ExpansionContext::default(),
            typeahead_limit: config.typeahead_limit,
            today: None,
            views: DashMap::new(),
            projections: DashMap::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Arc<dyn AttributeStore>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_expansion(mut self, expansion: ExpansionContext) -> Self {
        self.expansion = expansion;
        self
    }

    /// Pins the date auto filters see; the local date is used otherwise.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn compile_context<'a>(&'a self, principal: &'a str) -> CompileContext<'a> {
        let ctx = CompileContext::new(self.store.as_ref(), principal);
        match self.today {
            Some(today) => ctx.with_today(today),
            None => ctx,
        }
    }

    /// Listeners to subscribe to the invalidation dispatcher, record cache first.
    pub fn listeners(self: &Arc<Self>) -> Vec<Arc<dyn InvalidationListener>> {
        let records: Arc<dyn InvalidationListener> = self.records.clone();
        let views: Arc<dyn InvalidationListener> = self.clone();
        vec![records, views]
    }

    pub fn bindings(&self) -> &BindingFactory {
        &self.bindings
    }

    pub fn selections(&self) -> &SelectionStore {
        &self.selections
    }

    pub fn record_cache(&self) -> &Arc<RecordCache> {
        &self.records
    }

    #[instrument(skip_all, fields(entity_type = %request.entity_type))]
    pub fn create(&self, request: CreateViewRequest, cancel: &CancellationToken) -> Result<Arc<View>> {
        if !request.scope.allows_entity(&request.entity_type) {
            return Err(EngineError::UnknownEntityType(request.entity_type.to_string()));
        }
        let binding = self.bindings.get(&request.entity_type)?;

        let (sticky_filters, mut ids) = split_ids_filter(request.sticky_filters)?;
        if let Some(keys) = request.filter_only_ids {
            ids = Some(IdsFilterData::only(keys));
        }
        let filters = if request.filters.is_empty() && ids.is_none() {
            let ctx = self.compile_context(&request.scope.principal);
            binding.auto_filters(&ctx)
        } else {
            request.filters
        };
        let order = request.order.unwrap_or_else(|| binding.default_order.clone());

        let handle = ViewHandle::new(request.entity_type);
        let state = self.compute(&handle, &binding, filters, sticky_filters, ids, order, &request.scope, cancel)?;
        let view = Arc::new(View::new(
            handle.clone(),
            binding,
            request.kind,
            Arc::new(request.scope),
            request.parent,
            state,
        ));
        self.views.insert(handle.clone(), view.clone());
        debug!(view = %handle, rows = view.selection()?.len(), "view created");
        Ok(view)
    }

    /// Compiles the view's filters and materializes a fresh selection.
    #[allow(clippy::too_many_arguments)]
    fn compute(
        &self,
        handle: &ViewHandle,
        binding: &ViewBinding,
        filters: Vec<Filter>,
        sticky_filters: Vec<Filter>,
        ids: Option<IdsFilterData>,
        order: SortOrder,
        scope: &SecurityScope,
        cancel: &CancellationToken,
    ) -> Result<ViewState> {
        let query = self.compile(binding, &filters, &sticky_filters, ids.as_ref(), scope)?;
        let selection = self.selections.create(handle, query, order, scope, cancel)?;
        Ok(ViewState {
            filters,
            sticky_filters,
            ids,
            selection,
        })
    }

    /// Sticky filters first, then regular ones. Ids added explicitly match
    /// regardless of the other filters; the scope is applied later.
    fn compile(
        &self,
        binding: &ViewBinding,
        filters: &[Filter],
        sticky_filters: &[Filter],
        ids: Option<&IdsFilterData>,
        scope: &SecurityScope,
    ) -> Result<CompiledQuery> {
        let mut all: Vec<Filter> = sticky_filters.iter().chain(filters.iter()).cloned().collect();
        let mut must: &[RecordKey] = &[];
        if let Some(ids) = ids {
            must = &ids.must;
            let restriction = IdsFilterData {
                must: Vec::new(),
                ..ids.clone()
            };
            all.push(restriction.to_filter());
        }
        let ctx = self.compile_context(&scope.principal);
        Ok(binding.compile(&all, &ctx)?.or_keys(must))
    }

    /// Fails with `ViewNotFound` when the view is absent or `scope` may not see it.
    pub fn get(&self, handle: &ViewHandle, scope: &SecurityScope) -> Result<Arc<View>> {
        let view = self
            .views
            .get(handle)
            .map(|v| v.clone())
            .ok_or_else(|| EngineError::ViewNotFound(handle.to_string()))?;
        if !scope.can_access(view.scope(), view.entity_type()) {
            debug!(view = %handle, principal = %scope.principal, "view hidden from scope");
            return Err(EngineError::ViewNotFound(handle.to_string()));
        }
        Ok(view)
    }

    /// New, independent view with `filters` replacing the regular filters.
    /// Sticky filters, explicit ids and order carry over; the original view is untouched.
    #[instrument(skip_all, fields(view = %handle))]
    pub fn filter(
        &self,
        handle: &ViewHandle,
        filters: Vec<Filter>,
        scope: &SecurityScope,
        cancel: &CancellationToken,
    ) -> Result<Arc<View>> {
        let original = self.get(handle, scope)?;
        let state = original.snapshot()?;
        self.derive(&original, filters, state.sticky_filters.clone(), state.ids.clone(), &state, cancel)
    }

    /// New view without the sticky filter `filter_id`.
    pub fn delete_sticky_filter(
        &self,
        handle: &ViewHandle,
        filter_id: &str,
        scope: &SecurityScope,
        cancel: &CancellationToken,
    ) -> Result<Arc<View>> {
        let original = self.get(handle, scope)?;
        let state = original.snapshot()?;
        let (sticky, ids) = if filter_id == IDS_FILTER_ID && state.ids.is_some() {
            (state.sticky_filters.clone(), None)
        } else if state.has_sticky_filter(filter_id) {
            let sticky = state
                .sticky_filters
                .iter()
                .filter(|f| f.filter_id != filter_id)
                .cloned()
                .collect();
            (sticky, state.ids.clone())
        } else {
            return Err(FilterError::invalid(filter_id, "filter_id", "not a sticky filter of this view").into());
        };
        self.derive(&original, state.filters.clone(), sticky, ids, &state, cancel)
    }

    fn derive(
        &self,
        original: &View,
        filters: Vec<Filter>,
        sticky_filters: Vec<Filter>,
        ids: Option<IdsFilterData>,
        state: &ViewState,
        cancel: &CancellationToken,
    ) -> Result<Arc<View>> {
        let handle = ViewHandle::new(original.entity_type().clone());
        let state = self.compute(
            &handle,
            original.binding(),
            filters,
            sticky_filters,
            ids,
            state.selection.order.clone(),
            original.scope(),
            cancel,
        )?;
        let view = Arc::new(View::new(
            handle.clone(),
            original.binding().clone(),
            original.kind(),
            original.scope().clone(),
            original.parent().cloned(),
            state,
        ));
        self.views.insert(handle.clone(), view.clone());
        debug!(from = %original.handle(), view = %handle, "view derived");
        Ok(view)
    }

    /// Removes the view and releases its selections and cached projections.
    pub fn close(&self, handle: &ViewHandle, action: ViewCloseAction) -> Result<()> {
        let (_, view) = self
            .views
            .remove(handle)
            .ok_or_else(|| EngineError::ViewNotFound(handle.to_string()))?;
        let _writer = view.close_writer()?;
        let disposed = self.selections.dispose_view(handle);
        self.evict_projections(handle);
        info!(view = %handle, ?action, disposed, age_ms = (chrono::Utc::now() - view.created_at()).num_milliseconds(), "view closed");
        Ok(())
    }

    /// Marks the view stale; the next page recomputes it.
    pub fn invalidate(&self, handle: &ViewHandle) -> Result<()> {
        let view = self
            .views
            .get(handle)
            .map(|v| v.clone())
            .ok_or_else(|| EngineError::ViewNotFound(handle.to_string()))?;
        view.mark_stale();
        self.evict_projections(handle);
        debug!(view = %handle, "view invalidated");
        Ok(())
    }

    /// Current state, recomputed first when the view is stale.
    fn current_state(&self, view: &View, cancel: &CancellationToken) -> Result<Arc<ViewState>> {
        if !view.is_stale() {
            return view.snapshot();
        }
        let _writer = view.lock_writer()?;
        if !view.take_stale() {
            // recomputed by a concurrent caller
            return view.snapshot();
        }
        let state = view.snapshot()?;
        let recomputed = self.compute(
            view.handle(),
            view.binding(),
            state.filters.clone(),
            state.sticky_filters.clone(),
            state.ids.clone(),
            state.selection.order.clone(),
            view.scope(),
            cancel,
        );
        let recomputed = match recomputed {
            Ok(recomputed) => recomputed,
            Err(err) => {
                view.mark_stale();
                return Err(err);
            }
        };
        let previous = view.publish(recomputed)?;
        self.selections.dispose(&previous.selection.id);
        debug!(view = %view.handle(), "stale view recomputed");
        view.snapshot()
    }

    #[instrument(skip(self, scope, cancel), fields(view = %handle))]
    pub fn page(
        &self,
        handle: &ViewHandle,
        scope: &SecurityScope,
        first_row: usize,
        page_length: usize,
        cancel: &CancellationToken,
    ) -> Result<ViewPage> {
        let view = self.get(handle, scope)?;
        let state = self.current_state(&view, cancel)?;
        let page = self.selections.page(&state.selection, first_row, page_length);
        let rows = self.materializer(&view).materialize(&page.row_ids);
        Ok(ViewPage {
            handle: handle.clone(),
            selection: state.selection.clone(),
            page,
            rows,
        })
    }

    /// Current selection, recomputed first when stale.
    pub fn selection(&self, handle: &ViewHandle, scope: &SecurityScope, cancel: &CancellationToken) -> Result<OrderedSelection> {
        let view = self.get(handle, scope)?;
        Ok(self.current_state(&view, cancel)?.selection.clone())
    }

    /// Materializes arbitrary rows of the view, including nested ones.
    pub fn rows_by_ids(&self, handle: &ViewHandle, scope: &SecurityScope, ids: &[RowId]) -> Result<MaterializedPage> {
        let view = self.get(handle, scope)?;
        Ok(self.materializer(&view).materialize(ids))
    }

    fn materializer<'a>(&'a self, view: &'a View) -> RowMaterializer<'a> {
        RowMaterializer::new(
            view.binding(),
            self.store.as_ref(),
            &self.records,
            self.attributes.as_deref(),
            &self.expansion,
        )
    }

    /// Attribute projection of one row, cached per (view, row).
    pub fn attributes(&self, handle: &ViewHandle, scope: &SecurityScope, row_id: &RowId) -> Result<Arc<AttributeProjection>> {
        let view = self.get(handle, scope)?;
        let key = (handle.clone(), row_id.clone());
        if let Some(projection) = self.projections.get(&key) {
            return Ok(projection.clone());
        }

        let store = match &self.attributes {
            Some(store) if view.binding().supports_attributes => store.clone(),
            _ => return Err(EngineError::UnknownAttribute(format!("{row_id}: attributes are not supported"))),
        };
        let row = self.materializer(&view).materialize_one(row_id)?;
        let source = row
            .attributes_record()
            .cloned()
            .ok_or_else(|| EngineError::UnknownAttribute(format!("{row_id}: row has no attributes")))?;

        let mut rules = ProjectionRules {
            forced_readonly: row.is_processed(),
            ..ProjectionRules::editable()
        };
        if let Some(hierarchy) = &view.binding().hierarchy {
            let record = self
                .records
                .load(self.store.as_ref(), &source.table, &source.key)
                .map_err(EngineError::store)?
                .ok_or_else(|| EngineError::RecordNotFound(source.to_string()))?;
            rules.active = record.get_bool(&hierarchy.active_field).unwrap_or(true);
            rules.status = record.get_str(&hierarchy.status_field).map(Into::into);
            rules.editable_status = Some(hierarchy.editable_status.clone());
        }

        let projection = Arc::new(AttributeProjection::build(
            row_id.clone(),
            source,
            store,
            &rules,
            self.typeahead_limit,
        )?);
        let projection = self.projections.entry(key.clone()).or_insert(projection).clone();
        if view.is_closed() {
            self.projections.remove(&key);
            return Err(EngineError::ViewNotFound(handle.to_string()));
        }
        Ok(projection)
    }

    /// Appends rows at the end of the current selection; see [`SelectionStore::add_ids`].
    ///
    /// Added records also survive a later recompute, where they take their
    /// sorted position.
    pub fn add_ids(&self, handle: &ViewHandle, scope: &SecurityScope, ids: &[RowId]) -> Result<OrderedSelection> {
        let view = self.get(handle, scope)?;
        let _writer = view.lock_writer()?;
        let state = view.snapshot()?;
        let next = self.selections.add_ids(&state.selection, ids)?;
        if next.id == state.selection.id {
            return Ok(next);
        }
        let added: SmallVec<[RecordKey; 8]> = ids
            .iter()
            .filter(|id| id.is_top_level() && !state.selection.contains(id) && next.contains(id))
            .map(|id| id.record_key().clone())
            .collect();
        let mut ids_data = state.ids.clone().unwrap_or_default();
        ids_data.include(&added);
        self.replace(&view, &state, next.clone(), Some(ids_data))?;
        Ok(next)
    }

    pub fn remove_ids(&self, handle: &ViewHandle, scope: &SecurityScope, ids: &[RowId]) -> Result<OrderedSelection> {
        let view = self.get(handle, scope)?;
        let _writer = view.lock_writer()?;
        let state = view.snapshot()?;
        let next = self.selections.remove_ids(&state.selection, ids)?;
        if next.id == state.selection.id {
            return Ok(next);
        }
        let removed: SmallVec<[RecordKey; 8]> = ids
            .iter()
            .filter(|id| id.is_top_level() && state.selection.contains(id))
            .map(|id| id.record_key().clone())
            .collect();
        let mut ids_data = state.ids.clone().unwrap_or_default();
        ids_data.exclude(&removed);
        for id in ids {
            self.projections.remove(&(handle.clone(), id.clone()));
        }
        self.replace(&view, &state, next.clone(), Some(ids_data))?;
        Ok(next)
    }

    pub fn contains_any(&self, handle: &ViewHandle, scope: &SecurityScope, ids: &[RowId]) -> Result<bool> {
        let view = self.get(handle, scope)?;
        let state = view.snapshot()?;
        Ok(self.selections.contains_any(&state.selection, ids))
    }

    pub fn resort(
        &self,
        handle: &ViewHandle,
        scope: &SecurityScope,
        order: SortOrder,
        cancel: &CancellationToken,
    ) -> Result<OrderedSelection> {
        let view = self.get(handle, scope)?;
        let _writer = view.lock_writer()?;
        let state = view.snapshot()?;
        let next = self.selections.resort(&state.selection, order, cancel)?;
        self.replace(&view, &state, next.clone(), state.ids.clone())?;
        Ok(next)
    }

    /// Publishes `selection` as the view's current one. Callers hold the writer lock.
    fn replace(
        &self,
        view: &View,
        state: &ViewState,
        selection: OrderedSelection,
        ids: Option<IdsFilterData>,
    ) -> Result<()> {
        let mut next = state.with_selection(selection);
        next.ids = ids;
        let previous = view.publish(next)?;
        self.selections.dispose(&previous.selection.id);
        Ok(())
    }

    pub fn layout(&self, handle: &ViewHandle, scope: &SecurityScope) -> Result<Arc<ViewLayout>> {
        let view = self.get(handle, scope)?;
        self.bindings.layout(view.entity_type(), view.kind())
    }

    pub fn views(&self) -> Vec<ViewHandle> {
        self.views.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    fn evict_projections(&self, handle: &ViewHandle) {
        self.projections.retain(|(owner, _), _| owner != handle);
    }

    /// Marks every view affected by `batch` stale. A failing view is logged
    /// and skipped. Returns the number of views marked.
    pub fn notify_records_changed(&self, batch: &ChangeBatch) -> usize {
        let touched = batch.touched_tables();
        let views: Vec<Arc<View>> = self.views.iter().map(|entry| entry.value().clone()).collect();
        let mut notified = 0;
        for view in views {
            match self.affects(&view, batch, &touched) {
                Ok(false) => {}
                Ok(true) => {
                    view.mark_stale();
                    self.evict_projections(view.handle());
                    notified += 1;
                }
                Err(err) => warn!(view = %view.handle(), error = %err, "view invalidation failed"),
            }
        }
        if notified > 0 {
            debug!(notified, "views marked stale");
        }
        notified
    }

    fn affects(&self, view: &View, batch: &ChangeBatch, touched: &FastSet<TableName>) -> Result<bool> {
        let binding = view.binding();
        if !touched.iter().any(|table| binding.references_table(table)) {
            return Ok(false);
        }
        if binding.refresh_on_change
            || touched.iter().any(|table| *table != binding.table && binding.references_table(table))
            || batch.tables().any(|table| *table == binding.table)
        {
            return Ok(true);
        }

        let state = view.snapshot()?;
        let selection = &state.selection;
        for key in batch.keys_of(&binding.table) {
            if selection.contains(&RowId::Record(key.clone())) {
                return Ok(true);
            }
            // a record outside the selection matters only if it would now be selected
            let record = self.store.load(&binding.table, key).map_err(EngineError::store)?;
            if let Some(record) = record {
                let matches = selection.query.predicate.matches(&record, &selection.query.params)
                    && selection.scope.permits(&record);
                if matches {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

impl InvalidationListener for ViewRegistry {
    fn name(&self) -> &str {
        "view-registry"
    }

    fn on_batch(&self, batch: &ChangeBatch) -> anyhow::Result<usize> {
        Ok(self.notify_records_changed(batch))
    }
}

/// Separates a sticky ids filter from the other sticky filters.
fn split_ids_filter(sticky: Vec<Filter>) -> Result<(Vec<Filter>, Option<IdsFilterData>)> {
    let mut ids = None;
    let mut rest = Vec::with_capacity(sticky.len());
    for filter in sticky {
        if filter.filter_id == IDS_FILTER_ID {
            ids = Some(IdsFilterData::from_filter(&filter)?);
        } else {
            rest.push(filter);
        }
    }
    Ok((rest, ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::binding::{EntityDescriptor, FieldBinding, StaticMetadata, WidgetType};
    use crate::engine::query::OrderBy;
    use crate::engine::store::InMemoryRecordStore;
    use crate::engine::types::{Record, Value};
    use serde_json::json;

    fn registry() -> ViewRegistry {
        let store = InMemoryRecordStore::with_records(
            ["b", "a", "c"].map(|k| Record::new("product", k, Value::from(json!({ "name": k })))),
        );
        let metadata = StaticMetadata::new([EntityDescriptor::new("products", "product")
            .field(FieldBinding::column("name", WidgetType::Text))
            .order(SortOrder::by("name"))]);
        ViewRegistry::new(Arc::new(store), Arc::new(metadata), &EngineConfig::default())
    }

    #[test]
    fn test_writers_holding_a_closed_view_register_nothing() {
        let registry = registry();
        let scope = SecurityScope::unrestricted("tester");
        let cancel = CancellationToken::new();
        let view = registry
            .create(CreateViewRequest::new("products", scope), &cancel)
            .unwrap();
        registry.invalidate(view.handle()).unwrap();

        registry.close(view.handle(), ViewCloseAction::Done).unwrap();
        assert!(view.is_closed());

        let err = registry.current_state(&view, &cancel).unwrap_err();
        assert!(matches!(err, EngineError::ViewNotFound(_)));
        assert!(view.lock_writer().is_err());
        assert_eq!(registry.selections().stats().live_selections, 0);
    }

    #[test]
    fn test_close_waits_for_the_running_writer() {
        let registry = registry();
        let scope = SecurityScope::unrestricted("tester");
        let cancel = CancellationToken::new();
        let view = registry
            .create(CreateViewRequest::new("products", scope), &cancel)
            .unwrap();
        let handle = view.handle().clone();

        std::thread::scope(|s| {
            let writer = view.lock_writer().unwrap();
            let closing = s.spawn(|| registry.close(&handle, ViewCloseAction::Cancel));
            // the writer still holds the lock: its resort lands before close disposes
            let state = view.snapshot().unwrap();
            let next = registry
                .selections
                .resort(&state.selection, SortOrder(vec![OrderBy::desc("name")]), &cancel)
                .unwrap();
            registry.replace(&view, &state, next, state.ids.clone()).unwrap();
            drop(writer);
            closing.join().unwrap().unwrap();
        });

        assert!(view.is_closed());
        assert_eq!(registry.selections().stats().live_selections, 0);
    }
}
