use crate::engine::binding::WidgetType;
use crate::engine::types::{RowId, Value};
use serde::Serialize;
use smol_str::SmolStr;
use std::sync::Mutex;

/// An attribute value was created or changed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub row_id: RowId,
    pub attribute: SmolStr,
    pub value: Value,
    pub widget: WidgetType,
}

/// Request-scoped receiver of change events, owned by the calling layer.
pub trait ChangesSink: Send + Sync {
    fn collect(&self, event: ChangeEvent);
}

/// Buffers events until the caller drains them.
#[derive(Default)]
pub struct ChangesCollector {
    events: Mutex<Vec<ChangeEvent>>,
}

impl ChangesCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<ChangeEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChangesSink for ChangesCollector {
    fn collect(&self, event: ChangeEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
