use crate::engine::binding::HierarchyRules;
use crate::engine::types::Record;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Closed classification deciding how a record expands into child rows.
///
/// | kind                 | children                                              |
/// |----------------------|-------------------------------------------------------|
/// | `Plain`              | none                                                  |
/// | `AggregateContainer` | one storage leaf per product held by the container    |
/// | `NestedContainer`    | one row per directly included container, recursively  |
/// | `TransportContainer` | one storage leaf per (included container, product)    |
/// | `VirtualContainer`   | none                                                  |
/// | `StorageLeaf`        | none                                                  |
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Plain,
    AggregateContainer,
    NestedContainer,
    TransportContainer,
    VirtualContainer,
    StorageLeaf,
}

impl RowKind {
    /// Records of entities without hierarchy rules are plain. Container
    /// records with a missing or unrecognized unit type are an error.
    pub fn classify(record: &Record, rules: Option<&HierarchyRules>) -> Result<RowKind> {
        let Some(rules) = rules else {
            return Ok(RowKind::Plain);
        };
        let unit = record.get_str(&rules.unit_type_field).unwrap_or_default();
        let aggregated = record.get_bool(&rules.aggregated_field).unwrap_or(false);

        if unit == rules.nested_unit {
            Ok(RowKind::NestedContainer)
        } else if unit == rules.transport_unit {
            Ok(if aggregated {
                RowKind::AggregateContainer
            } else {
                RowKind::TransportContainer
            })
        } else if unit == rules.virtual_unit {
            Ok(RowKind::VirtualContainer)
        } else {
            Err(EngineError::UnknownRowKind {
                record: record.reference().to_string(),
                kind: if unit.is_empty() { "<missing>".to_string() } else { unit.to_string() },
            })
        }
    }

    pub fn is_container(&self) -> bool {
        match self {
            RowKind::AggregateContainer
            | RowKind::NestedContainer
            | RowKind::TransportContainer
            | RowKind::VirtualContainer => true,
            RowKind::Plain | RowKind::StorageLeaf => false,
        }
    }
}
