use super::cancel::CancellationToken;
use super::data::{SelectionBuilder, SelectionData, SelectionPage};
use crate::config::EngineConfig;
use crate::engine::query::{CompiledQuery, Predicate, SecurityScope, SortOrder};
use crate::engine::store::RecordStore;
use crate::engine::types::{FastSet, RecordKey, RowId, SelectionId, ViewHandle};
use crate::error::{EngineError, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Immutable snapshot of one materialized selection. Cheap to clone; every
/// mutation returns a new snapshot under a new [`SelectionId`].
#[derive(Clone, Debug)]
pub struct OrderedSelection {
    pub id: SelectionId,
    pub view: ViewHandle,
    /// Filter query the selection was built from, without the security scope.
    pub query: Arc<CompiledQuery>,
    pub scope: Arc<SecurityScope>,
    pub order: SortOrder,
    data: Arc<SelectionData>,
}

impl OrderedSelection {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    pub fn contains(&self, row_id: &RowId) -> bool {
        self.data.contains(row_id)
    }

    pub fn row_ids(&self) -> impl Iterator<Item = &RowId> {
        self.data.iter()
    }

    /// 1-based paging sequence number of a row.
    pub fn seq_of(&self, row_id: &RowId) -> Option<u64> {
        self.data.seq_of(row_id)
    }

    fn derive(&self, data: SelectionData, order: SortOrder) -> Self {
        Self {
            id: SelectionId::new(),
            view: self.view.clone(),
            query: self.query.clone(),
            scope: self.scope.clone(),
            order,
            data: Arc::new(data),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SelectionStats {
    pub live_selections: usize,
    pub total_rows: usize,
}

/// Materializes query results into ordered selections and serves them by handle.
pub struct SelectionStore {
    store: Arc<dyn RecordStore>,
    selections: DashMap<SelectionId, OrderedSelection>,
    chunk_size: usize,
    max_page_length: usize,
}

impl SelectionStore {
    pub fn new(store: Arc<dyn RecordStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            selections: DashMap::new(),
            chunk_size: config.chunk_size(),
            max_page_length: config.max_page_length.max(1),
        }
    }

    /// Executes `query` restricted by `scope` and stores the ordered ids.
    ///
    /// Nothing is registered unless the whole result was read: a store error
    /// or a cancellation leaves no partial selection behind.
    #[instrument(skip_all, fields(view = %view, table = %query.table))]
    pub fn create(
        &self,
        view: &ViewHandle,
        query: CompiledQuery,
        order: SortOrder,
        scope: &SecurityScope,
        cancel: &CancellationToken,
    ) -> Result<OrderedSelection> {
        let data = if query.is_empty_result() {
            trace!("query cannot match; skipping execution");
            SelectionData::empty(self.chunk_size)
        } else {
            let executable = query.and(scope.predicate.clone());
            self.execute(&executable, &order, cancel)?
        };

        let selection = OrderedSelection {
            id: SelectionId::new(),
            view: view.clone(),
            query: Arc::new(query),
            scope: Arc::new(scope.clone()),
            order,
            data: Arc::new(data),
        };
        debug!(selection = %selection.id, rows = selection.len(), "selection created");
        self.register(selection.clone());
        Ok(selection)
    }

    fn execute(
        &self,
        query: &CompiledQuery,
        order: &SortOrder,
        cancel: &CancellationToken,
    ) -> Result<SelectionData> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let cursor = self.store.query(query, order).map_err(EngineError::store)?;
        let mut builder = SelectionBuilder::new(self.chunk_size);
        for key in cursor {
            let key = key.map_err(EngineError::store)?;
            if builder.push(RowId::Record(key)) && cancel.is_cancelled() {
                debug!(rows = builder.len(), "selection creation cancelled");
                return Err(EngineError::Cancelled);
            }
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(builder.finish())
    }

    fn register(&self, selection: OrderedSelection) {
        self.selections.insert(selection.id, selection);
    }

    pub fn get(&self, id: &SelectionId) -> Option<OrderedSelection> {
        self.selections.get(id).map(|s| s.clone())
    }

    /// Reads a page from a snapshot. Never blocks on writers.
    pub fn page(&self, selection: &OrderedSelection, first_row: usize, page_length: usize) -> SelectionPage {
        selection.data.page(first_row, page_length.min(self.max_page_length))
    }

    pub fn page_by_id(&self, id: &SelectionId, first_row: usize, page_length: usize) -> Result<SelectionPage> {
        let selection = self
            .get(id)
            .ok_or_else(|| EngineError::SelectionNotFound(id.to_string()))?;
        Ok(self.page(&selection, first_row, page_length))
    }

    /// Appends `ids` at the end in the given order.
    ///
    /// Ids are not checked against the selection's filter, only against its
    /// security scope; ids the scope rejects, ids of missing records and
    /// non-root ids are skipped. Returns the same snapshot when nothing changed.
    #[instrument(skip_all, fields(selection = %selection.id, requested = ids.len()))]
    pub fn add_ids(&self, selection: &OrderedSelection, ids: &[RowId]) -> Result<OrderedSelection> {
        let mut seen = FastSet::default();
        let candidates: Vec<RecordKey> = ids
            .iter()
            .filter_map(|id| match id {
                RowId::Record(key) if !selection.contains(id) && seen.insert(key.clone()) => Some(key.clone()),
                _ => None,
            })
            .collect();
        if candidates.is_empty() {
            return Ok(selection.clone());
        }

        let records = self
            .store
            .load_many(&selection.query.table, &candidates)
            .map_err(EngineError::store)?;
        let permitted: FastSet<RecordKey> = records
            .iter()
            .filter(|r| selection.scope.permits(r))
            .map(|r| r.key.clone())
            .collect();
        if permitted.len() < candidates.len() {
            debug!(
                skipped = candidates.len() - permitted.len(),
                "ids outside the security scope were not added"
            );
        }

        let accepted = candidates
            .into_iter()
            .filter(|k| permitted.contains(k))
            .map(RowId::Record);
        let data = selection.data.appended(accepted);
        if data.len() == selection.len() {
            return Ok(selection.clone());
        }
        let next = selection.derive(data, selection.order.clone());
        self.register(next.clone());
        Ok(next)
    }

    /// Removes `ids`; absent ids are ignored. Returns the same snapshot when nothing changed.
    pub fn remove_ids(&self, selection: &OrderedSelection, ids: &[RowId]) -> Result<OrderedSelection> {
        let doomed: FastSet<RowId> = ids.iter().filter(|id| selection.contains(id)).cloned().collect();
        if doomed.is_empty() {
            return Ok(selection.clone());
        }
        let next = selection.derive(selection.data.without(&doomed), selection.order.clone());
        debug!(selection = %next.id, removed = doomed.len(), "rows removed");
        self.register(next.clone());
        Ok(next)
    }

    pub fn contains_any(&self, selection: &OrderedSelection, ids: &[RowId]) -> bool {
        ids.iter().any(|id| selection.contains(id))
    }

    /// Reorders the current rows (including added ones) under `order`.
    ///
    /// The base set is the selection's own ids, so the filters are not
    /// compiled again. The scope is still applied.
    #[instrument(skip_all, fields(selection = %selection.id))]
    pub fn resort(
        &self,
        selection: &OrderedSelection,
        order: SortOrder,
        cancel: &CancellationToken,
    ) -> Result<OrderedSelection> {
        let data = if selection.is_empty() {
            SelectionData::empty(self.chunk_size)
        } else {
            let keys: Vec<RecordKey> = selection.row_ids().map(|id| id.record_key().clone()).collect();
            let query = CompiledQuery::new(selection.query.table.clone())
                .and(Predicate::KeyIn { keys })
                .and(selection.scope.predicate.clone());
            self.execute(&query, &order, cancel)?
        };
        let next = selection.derive(data, order);
        self.register(next.clone());
        Ok(next)
    }

    /// Releases a selection. Disposing twice is a no-op.
    pub fn dispose(&self, id: &SelectionId) -> bool {
        let removed = self.selections.remove(id).is_some();
        if removed {
            trace!(selection = %id, "selection disposed");
        }
        removed
    }

    /// Disposes every selection of a view; returns how many were live.
    pub fn dispose_view(&self, view: &ViewHandle) -> usize {
        let before = self.selections.len();
        self.selections.retain(|_, s| &s.view != view);
        before.saturating_sub(self.selections.len())
    }

    pub fn stats(&self) -> SelectionStats {
        self.selections.iter().fold(SelectionStats::default(), |mut stats, entry| {
            stats.live_selections += 1;
            stats.total_rows += entry.len();
            stats
        })
    }
}
