use super::keys::EntityType;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Opaque identifier of a live view, scoped to the entity type it shows.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewHandle {
    pub entity_type: EntityType,
    pub id: Ulid,
}

impl ViewHandle {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            id: Ulid::new(),
        }
    }
}

impl fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.entity_type, self.id)
    }
}

/// Identifies one materialization of a selection. Every mutation yields a new id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionId(pub Ulid);

impl SelectionId {
    pub fn new() -> Self {
        SelectionId(Ulid::new())
    }
}

impl Default for SelectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SelectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
