use super::predicate::Predicate;
use super::QueryParams;
use crate::engine::types::{EntityType, FastSet, Record};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Caller-supplied restriction ANDed into every selection query.
///
/// There is no "no scope" path: callers without restrictions pass
/// [`SecurityScope::unrestricted`] explicitly.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SecurityScope {
    pub principal: SmolStr,
    pub predicate: Predicate,
    /// Entity types this principal may open views on; `None` allows all.
    #[serde(default)]
    pub entity_types: Option<FastSet<EntityType>>,
}

impl SecurityScope {
    pub fn new(principal: impl Into<SmolStr>, predicate: Predicate) -> Self {
        Self {
            principal: principal.into(),
            predicate,
            entity_types: None,
        }
    }

    pub fn unrestricted(principal: impl Into<SmolStr>) -> Self {
        Self::new(principal, Predicate::always())
    }

    pub fn with_entity_types(mut self, types: impl IntoIterator<Item = EntityType>) -> Self {
        self.entity_types = Some(types.into_iter().collect());
        self
    }

    pub fn allows_entity(&self, entity_type: &EntityType) -> bool {
        self.entity_types
            .as_ref()
            .map_or(true, |allowed| allowed.contains(entity_type))
    }

    pub fn permits(&self, record: &Record) -> bool {
        self.predicate.matches(record, &QueryParams::new())
    }

    /// Whether a view created under `owner` may be read by this scope.
    pub fn can_access(&self, owner: &SecurityScope, entity_type: &EntityType) -> bool {
        self.allows_entity(entity_type) && (self == owner || self.principal == owner.principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Value;
    use serde_json::json;

    #[test]
    fn test_permits_evaluates_predicate() {
        let scope = SecurityScope::new("alice", Predicate::eq("org", "north"));
        let north = Record::new("container", "1", Value::from(json!({"org": "north"})));
        let south = Record::new("container", "2", Value::from(json!({"org": "south"})));
        assert!(scope.permits(&north));
        assert!(!scope.permits(&south));
    }

    #[test]
    fn test_entity_restriction() {
        let scope = SecurityScope::unrestricted("bob").with_entity_types([EntityType::from("container")]);
        assert!(scope.allows_entity(&EntityType::from("container")));
        assert!(!scope.allows_entity(&EntityType::from("invoice")));
    }

    #[test]
    fn test_access_is_bound_to_principal() {
        let owner = SecurityScope::unrestricted("alice");
        let entity = EntityType::from("container");
        assert!(SecurityScope::unrestricted("alice").can_access(&owner, &entity));
        assert!(!SecurityScope::unrestricted("mallory").can_access(&owner, &entity));
    }
}
