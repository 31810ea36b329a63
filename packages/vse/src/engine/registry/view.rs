use crate::engine::binding::{ViewBinding, ViewKind};
use crate::engine::filter::{Filter, IdsFilterData};
use crate::engine::query::SecurityScope;
use crate::engine::selection::OrderedSelection;
use crate::engine::types::{EntityType, ViewHandle};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewCloseAction {
    Cancel,
    Done,
}

/// Everything a view's rows are computed from, plus the resulting selection.
#[derive(Clone, Debug)]
pub struct ViewState {
    pub filters: Vec<Filter>,
    pub sticky_filters: Vec<Filter>,
    /// Explicit id restriction, additions and removals.
    pub ids: Option<IdsFilterData>,
    pub selection: OrderedSelection,
}

impl ViewState {
    pub(crate) fn with_selection(&self, selection: OrderedSelection) -> Self {
        Self {
            selection,
            ..self.clone()
        }
    }

    pub fn has_sticky_filter(&self, filter_id: &str) -> bool {
        self.sticky_filters.iter().any(|f| f.filter_id == filter_id)
    }
}

/// One live view. Readers take the current [`ViewState`] snapshot; writers
/// are serialized by a per-view lock and publish a whole new state.
pub struct View {
    handle: ViewHandle,
    binding: Arc<ViewBinding>,
    kind: ViewKind,
    scope: Arc<SecurityScope>,
    parent: Option<ViewHandle>,
    created_at: DateTime<Utc>,
    stale: AtomicBool,
    closed: AtomicBool,
    writer: Mutex<()>,
    state: RwLock<Arc<ViewState>>,
}

impl View {
    pub(crate) fn new(
        handle: ViewHandle,
        binding: Arc<ViewBinding>,
        kind: ViewKind,
        scope: Arc<SecurityScope>,
        parent: Option<ViewHandle>,
        state: ViewState,
    ) -> Self {
        Self {
            handle,
            binding,
            kind,
            scope,
            parent,
            created_at: Utc::now(),
            stale: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            writer: Mutex::new(()),
            state: RwLock::new(Arc::new(state)),
        }
    }

    pub fn handle(&self) -> &ViewHandle {
        &self.handle
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.handle.entity_type
    }

    pub fn binding(&self) -> &Arc<ViewBinding> {
        &self.binding
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn scope(&self) -> &Arc<SecurityScope> {
        &self.scope
    }

    pub fn parent(&self) -> Option<&ViewHandle> {
        self.parent.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Returns true when the view was fresh before.
    pub(crate) fn mark_stale(&self) -> bool {
        !self.stale.swap(true, Ordering::AcqRel)
    }

    /// Clears the flag, returning whether it was set.
    pub(crate) fn take_stale(&self) -> bool {
        self.stale.swap(false, Ordering::AcqRel)
    }

    pub fn snapshot(&self) -> Result<Arc<ViewState>> {
        Ok(self.state.read()?.clone())
    }

    pub fn selection(&self) -> Result<OrderedSelection> {
        Ok(self.snapshot()?.selection.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fails with `ViewNotFound` once the view is closed, so no writer can
    /// register a selection after [`close_writer`](Self::close_writer).
    pub(crate) fn lock_writer(&self) -> Result<MutexGuard<'_, ()>> {
        let guard = self.writer.lock()?;
        if self.is_closed() {
            return Err(EngineError::ViewNotFound(self.handle.to_string()));
        }
        Ok(guard)
    }

    /// Waits for the running writer, then marks the view closed.
    pub(crate) fn close_writer(&self) -> Result<MutexGuard<'_, ()>> {
        let guard = self.writer.lock()?;
        self.closed.store(true, Ordering::Release);
        Ok(guard)
    }

    /// Publishes `state`; returns the replaced one. Callers hold the writer lock.
    pub(crate) fn publish(&self, state: ViewState) -> Result<Arc<ViewState>> {
        let mut current = self.state.write()?;
        Ok(std::mem::replace(&mut *current, Arc::new(state)))
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .field("stale", &self.is_stale())
            .field("closed", &self.is_closed())
            .finish()
    }
}
