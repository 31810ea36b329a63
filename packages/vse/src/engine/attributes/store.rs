use crate::engine::binding::WidgetType;
use crate::engine::types::{FastMap, RecordRef, Value};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::RwLock;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AttributeDefinition {
    pub name: SmolStr,
    #[serde(default)]
    pub widget: WidgetType,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default = "default_true")]
    pub displayed: bool,
    #[serde(default)]
    pub mandatory: bool,
}

fn default_true() -> bool {
    true
}

impl AttributeDefinition {
    pub fn new(name: impl Into<SmolStr>, widget: WidgetType) -> Self {
        Self {
            name: name.into(),
            widget,
            readonly: false,
            displayed: true,
            mandatory: false,
        }
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

/// Dynamic attribute set attached to records.
pub trait AttributeStore: Send + Sync {
    fn definitions(&self, record: &RecordRef) -> anyhow::Result<Vec<AttributeDefinition>>;

    fn get_value(&self, record: &RecordRef, name: &str) -> anyhow::Result<Option<Value>>;

    fn set_value(&self, record: &RecordRef, name: &str, value: Value) -> anyhow::Result<()>;

    /// Candidate values for list-like attributes.
    fn available_values(&self, record: &RecordRef, name: &str) -> anyhow::Result<Vec<Value>>;
}

#[derive(Default)]
struct AttributeData {
    definitions: FastMap<RecordRef, Vec<AttributeDefinition>>,
    values: FastMap<(RecordRef, SmolStr), Value>,
    available: FastMap<SmolStr, Vec<Value>>,
}

/// Reference attribute store keeping everything in memory.
#[derive(Default)]
pub struct InMemoryAttributeStore {
    data: RwLock<AttributeData>,
}

impl InMemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&self, record: RecordRef, definitions: Vec<AttributeDefinition>) {
        if let Ok(mut data) = self.data.write() {
            data.definitions.insert(record, definitions);
        }
    }

    pub fn put(&self, record: RecordRef, name: &str, value: impl Into<Value>) {
        if let Ok(mut data) = self.data.write() {
            data.values.insert((record, SmolStr::new(name)), value.into());
        }
    }

    pub fn offer(&self, name: &str, values: Vec<Value>) {
        if let Ok(mut data) = self.data.write() {
            data.available.insert(SmolStr::new(name), values);
        }
    }
}

impl AttributeStore for InMemoryAttributeStore {
    fn definitions(&self, record: &RecordRef) -> anyhow::Result<Vec<AttributeDefinition>> {
        let data = self.data.read().map_err(|e| anyhow!("attribute store lock poisoned: {e}"))?;
        Ok(data.definitions.get(record).cloned().unwrap_or_default())
    }

    fn get_value(&self, record: &RecordRef, name: &str) -> anyhow::Result<Option<Value>> {
        let data = self.data.read().map_err(|e| anyhow!("attribute store lock poisoned: {e}"))?;
        Ok(data.values.get(&(record.clone(), SmolStr::new(name))).cloned())
    }

    fn set_value(&self, record: &RecordRef, name: &str, value: Value) -> anyhow::Result<()> {
        let mut data = self.data.write().map_err(|e| anyhow!("attribute store lock poisoned: {e}"))?;
        data.values.insert((record.clone(), SmolStr::new(name)), value);
        Ok(())
    }

    fn available_values(&self, _record: &RecordRef, name: &str) -> anyhow::Result<Vec<Value>> {
        let data = self.data.read().map_err(|e| anyhow!("attribute store lock poisoned: {e}"))?;
        Ok(data.available.get(name).cloned().unwrap_or_default())
    }
}
