use super::predicate::Predicate;
use super::QueryParams;
use crate::engine::types::{RecordKey, TableName, Value};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// What one filter compiles to: a predicate plus the parameter values it refers to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CompiledFragment {
    pub predicate: Predicate,
    #[serde(default)]
    pub params: QueryParams,
}

impl CompiledFragment {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            params: QueryParams::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Fragment that matches nothing.
    pub fn none() -> Self {
        Self::new(Predicate::never())
    }

    /// Prefixes every parameter with `<namespace>.` in both the predicate and the value map.
    pub fn namespaced(mut self, namespace: &str) -> Self {
        let rename = |name: &str| SmolStr::new(format!("{namespace}.{name}"));
        self.predicate.rename_params(&rename);
        self.params = self
            .params
            .into_iter()
            .map(|(k, v)| (rename(&k), v))
            .collect();
        self
    }
}

/// All active filters of a view composed with AND, bound to the table they run against.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CompiledQuery {
    pub table: TableName,
    pub predicate: Predicate,
    pub params: QueryParams,
}

impl CompiledQuery {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            predicate: Predicate::always(),
            params: QueryParams::new(),
        }
    }

    /// ANDs fragments in the given order; each fragment's params are kept under its namespace.
    pub fn compose(
        table: impl Into<TableName>,
        fragments: impl IntoIterator<Item = (SmolStr, CompiledFragment)>,
    ) -> Self {
        let mut params = QueryParams::new();
        let mut predicates = Vec::new();
        for (namespace, fragment) in fragments {
            let fragment = fragment.namespaced(&namespace);
            params.extend(fragment.params);
            predicates.push(fragment.predicate);
        }
        Self {
            table: table.into(),
            predicate: Predicate::and_all(predicates),
            params,
        }
    }

    /// Same query with an extra conjunct.
    pub fn and(&self, predicate: Predicate) -> Self {
        Self {
            table: self.table.clone(),
            predicate: Predicate::and_all([self.predicate.clone(), predicate]),
            params: self.params.clone(),
        }
    }

    /// Same query additionally matching the listed keys.
    pub fn or_keys(&self, keys: &[RecordKey]) -> Self {
        if keys.is_empty() {
            return self.clone();
        }
        Self {
            table: self.table.clone(),
            predicate: Predicate::Or {
                predicates: vec![self.predicate.clone(), Predicate::key_in(keys.iter().cloned())],
            },
            params: self.params.clone(),
        }
    }

    /// True when some fragment compiled to a constant-false predicate.
    pub fn is_empty_result(&self) -> bool {
        match &self.predicate {
            Predicate::And { predicates } => predicates.iter().any(Predicate::is_const_false),
            other => other.is_const_false(),
        }
    }

    /// Stable hash of the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&canonical).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::query::Operand;

    fn status_fragment(value: &str) -> CompiledFragment {
        CompiledFragment::new(Predicate::Eq {
            field: "status".into(),
            value: Operand::param("status"),
        })
        .with_param("status", value)
    }

    #[test]
    fn test_compose_namespaces_params() {
        let q = CompiledQuery::compose(
            "container",
            [
                (SmolStr::new("default"), status_fragment("A")),
                (SmolStr::new("other"), status_fragment("D")),
            ],
        );
        assert_eq!(q.params.get("default.status"), Some(&Value::str("A")));
        assert_eq!(q.params.get("other.status"), Some(&Value::str("D")));
        match &q.predicate {
            Predicate::And { predicates } => assert_eq!(predicates.len(), 2),
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = CompiledQuery::compose("container", [(SmolStr::new("f"), status_fragment("A"))]);
        let b = CompiledQuery::compose("container", [(SmolStr::new("f"), status_fragment("A"))]);
        let c = CompiledQuery::compose("container", [(SmolStr::new("f"), status_fragment("B"))]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_constant_false_detection() {
        let q = CompiledQuery::new("container").and(Predicate::never());
        assert!(q.is_empty_result());
        assert!(!CompiledQuery::new("container").is_empty_result());
    }

    #[test]
    fn test_or_keys_rescues_constant_false() {
        let q = CompiledQuery::new("container")
            .and(Predicate::never())
            .or_keys(&[SmolStr::new("7")]);
        assert!(!q.is_empty_result());
        assert_eq!(CompiledQuery::new("container").or_keys(&[]), CompiledQuery::new("container"));
    }
}
