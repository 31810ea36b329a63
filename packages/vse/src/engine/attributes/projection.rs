use super::changes::{ChangeEvent, ChangesSink};
use super::store::{AttributeDefinition, AttributeStore};
use crate::engine::types::{RecordRef, RowId, Value};
use crate::error::{EngineError, Result};
use chrono::NaiveDate;
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Record state deciding whether the whole attribute set is editable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectionRules {
    pub forced_readonly: bool,
    pub active: bool,
    pub status: Option<SmolStr>,
    /// When set, only records in this status are editable.
    pub editable_status: Option<SmolStr>,
}

impl ProjectionRules {
    pub fn editable() -> Self {
        Self {
            active: true,
            ..Self::default()
        }
    }

    fn all_readonly(&self) -> bool {
        if self.forced_readonly || !self.active {
            return true;
        }
        match (&self.editable_status, &self.status) {
            (Some(editable), Some(status)) => editable != status,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

struct AttributeState {
    definition: AttributeDefinition,
    readonly: bool,
}

/// Read/write facade over one row's dynamic attributes.
///
/// Flags are computed once at construction; values always go through the
/// underlying store.
pub struct AttributeProjection {
    row_id: RowId,
    record: RecordRef,
    attributes: IndexMap<SmolStr, AttributeState>,
    store: Arc<dyn AttributeStore>,
    typeahead_limit: usize,
}

impl AttributeProjection {
    pub fn build(
        row_id: RowId,
        record: RecordRef,
        store: Arc<dyn AttributeStore>,
        rules: &ProjectionRules,
        typeahead_limit: usize,
    ) -> Result<Self> {
        let all_readonly = rules.all_readonly();
        let attributes = store
            .definitions(&record)
            .map_err(EngineError::store)?
            .into_iter()
            .map(|definition| {
                let readonly = all_readonly || definition.readonly;
                (definition.name.clone(), AttributeState { definition, readonly })
            })
            .collect();
        debug!(row = %row_id, all_readonly, "attribute projection built");
        Ok(Self {
            row_id,
            record,
            attributes,
            store,
            typeahead_limit,
        })
    }

    pub fn row_id(&self) -> &RowId {
        &self.row_id
    }

    pub fn record(&self) -> &RecordRef {
        &self.record
    }

    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        self.attributes.keys()
    }

    fn state(&self, name: &str) -> Result<&AttributeState> {
        self.attributes
            .get(name)
            .ok_or_else(|| EngineError::UnknownAttribute(name.to_string()))
    }

    pub fn definition(&self, name: &str) -> Result<&AttributeDefinition> {
        Ok(&self.state(name)?.definition)
    }

    pub fn is_readonly(&self, name: &str) -> Result<bool> {
        Ok(self.state(name)?.readonly)
    }

    pub fn is_hidden(&self, name: &str) -> Result<bool> {
        Ok(!self.state(name)?.definition.displayed)
    }

    pub fn is_mandatory(&self, name: &str) -> Result<bool> {
        Ok(self.state(name)?.definition.mandatory)
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.state(name)?;
        Ok(self
            .store
            .get_value(&self.record, name)
            .map_err(EngineError::store)?
            .unwrap_or_default())
    }

    pub fn values(&self) -> Result<IndexMap<SmolStr, Value>> {
        let mut values = IndexMap::with_capacity(self.attributes.len());
        for name in self.attributes.keys() {
            values.insert(name.clone(), self.get(name)?);
        }
        Ok(values)
    }

    pub fn value_as_string(&self, name: &str) -> Result<Option<String>> {
        Ok(self.get(name)?.to_text().map(|s| s.to_string()))
    }

    /// Parses an ISO `YYYY-MM-DD` value; blank or unparsable values read as `None`.
    pub fn best_before_date(&self, name: &str) -> Result<Option<NaiveDate>> {
        Ok(self
            .get(name)?
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
    }

    /// Writes a value and reports the change to `sink`.
    #[instrument(skip(self, value, sink), fields(row = %self.row_id))]
    pub fn set(&self, name: &str, value: Value, sink: &dyn ChangesSink) -> Result<()> {
        let state = self.state(name)?;
        if state.readonly {
            return Err(EngineError::AttributeReadonly {
                row: self.row_id.to_string(),
                attribute: name.to_string(),
            });
        }
        self.store
            .set_value(&self.record, name, value.clone())
            .map_err(EngineError::store)?;
        sink.collect(ChangeEvent {
            row_id: self.row_id.clone(),
            attribute: state.definition.name.clone(),
            value,
            widget: state.definition.widget,
        });
        Ok(())
    }

    /// Case-insensitive contains match over the available values, capped.
    pub fn typeahead(&self, name: &str, query: &str) -> Result<Vec<Value>> {
        let needle = query.trim().to_lowercase();
        Ok(self
            .dropdown(name)?
            .into_iter()
            .filter(|v| {
                v.to_text()
                    .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
            .take(self.typeahead_limit)
            .collect())
    }

    pub fn dropdown(&self, name: &str) -> Result<Vec<Value>> {
        self.state(name)?;
        self.store
            .available_values(&self.record, name)
            .map_err(EngineError::store)
    }
}

impl fmt::Debug for AttributeProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeProjection")
            .field("row_id", &self.row_id)
            .field("record", &self.record)
            .field("attributes", &self.attributes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::attributes::{ChangesCollector, InMemoryAttributeStore};
    use crate::engine::binding::WidgetType;

    fn store() -> Arc<InMemoryAttributeStore> {
        let store = InMemoryAttributeStore::new();
        let record = RecordRef::new("container", "1");
        store.define(
            record.clone(),
            vec![
                AttributeDefinition::new("lot", WidgetType::Text),
                AttributeDefinition::new("best_before", WidgetType::Date).mandatory(),
                AttributeDefinition::new("weight", WidgetType::Number).readonly().hidden(),
                AttributeDefinition::new("origin", WidgetType::List),
            ],
        );
        store.put(record, "best_before", "2025-01-31");
        store.offer(
            "origin",
            (0..25).map(|i| Value::str(format!("Country {i}"))).collect(),
        );
        Arc::new(store)
    }

    fn projection(rules: &ProjectionRules) -> AttributeProjection {
        AttributeProjection::build(
            RowId::record("1"),
            RecordRef::new("container", "1"),
            store(),
            rules,
            10,
        )
        .unwrap()
    }

    #[test]
    fn test_flags_and_typed_reads() {
        let p = projection(&ProjectionRules::editable());
        assert!(!p.is_readonly("lot").unwrap());
        assert!(p.is_readonly("weight").unwrap());
        assert!(p.is_hidden("weight").unwrap());
        assert!(p.is_mandatory("best_before").unwrap());
        assert_eq!(p.best_before_date("best_before").unwrap(), NaiveDate::from_ymd_opt(2025, 1, 31));
        assert_eq!(p.value_as_string("lot").unwrap(), None);
        assert!(matches!(p.get("nope"), Err(EngineError::UnknownAttribute(_))));
    }

    #[test]
    fn test_set_emits_change_event() {
        let p = projection(&ProjectionRules::editable());
        let sink = ChangesCollector::new();
        p.set("lot", Value::str("L-7"), &sink).unwrap();
        assert_eq!(p.get("lot").unwrap(), Value::str("L-7"));
        let events = sink.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].attribute, "lot");
        assert_eq!(events[0].row_id, RowId::record("1"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_non_editable_status_makes_everything_readonly() {
        let rules = ProjectionRules {
            active: true,
            status: Some("active".into()),
            editable_status: Some("planning".into()),
            ..ProjectionRules::default()
        };
        let p = projection(&rules);
        let sink = ChangesCollector::new();
        let err = p.set("lot", Value::str("x"), &sink).unwrap_err();
        assert!(matches!(err, EngineError::AttributeReadonly { .. }));
        assert!(sink.is_empty());

        let inactive = projection(&ProjectionRules::default());
        assert!(inactive.is_readonly("lot").unwrap());
        let forced = projection(&ProjectionRules { forced_readonly: true, ..ProjectionRules::editable() });
        assert!(forced.is_readonly("origin").unwrap());
    }

    #[test]
    fn test_typeahead_is_capped_dropdown_is_not() {
        let p = projection(&ProjectionRules::editable());
        assert_eq!(p.typeahead("origin", "country").unwrap().len(), 10);
        assert_eq!(p.typeahead("origin", "TRY 2").unwrap().len(), 6);
        assert_eq!(p.dropdown("origin").unwrap().len(), 25);
    }
}
