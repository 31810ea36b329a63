use super::QueryParams;
use crate::engine::types::{Path, Record, RecordKey, Value};
use lazy_static::lazy_static;
use lru::LruCache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Right-hand side of a comparison: either inline or a named query parameter.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    Literal(Value),
    Param(SmolStr),
}

impl Operand {
    pub fn param(name: impl Into<SmolStr>) -> Self {
        Operand::Param(name.into())
    }

    fn resolve<'a>(&'a self, params: &'a QueryParams) -> Option<&'a Value> {
        match self {
            Operand::Literal(v) => Some(v),
            Operand::Param(name) => params.get(name),
        }
    }

    /// Renames a parameter reference; literals are untouched.
    fn map_param(&mut self, f: &impl Fn(&str) -> SmolStr) {
        if let Operand::Param(name) = self {
            *name = f(name);
        }
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Literal(v)
    }
}

/// Backend-neutral predicate tree a record store evaluates.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Predicate {
    Const { value: bool },
    Prefix { field: Path, prefix: String },
    Eq { field: Path, value: Operand },
    Neq { field: Path, value: Operand },
    Gt { field: Path, value: Operand },
    Gte { field: Path, value: Operand },
    Lt { field: Path, value: Operand },
    Lte { field: Path, value: Operand },
    /// SQL LIKE semantics (`%`, `_`), case-insensitive.
    Like { field: Path, pattern: Operand },
    In { field: Path, values: Vec<Value> },
    /// Matches records whose primary key is listed.
    KeyIn { keys: Vec<RecordKey> },
    IsNull { field: Path },
    And { predicates: Vec<Predicate> },
    Or { predicates: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

impl Predicate {
    pub fn always() -> Self {
        Predicate::Const { value: true }
    }

    pub fn never() -> Self {
        Predicate::Const { value: false }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            field: Path::new(field),
            value: Operand::Literal(value.into()),
        }
    }

    pub fn key_in<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<RecordKey>,
    {
        Predicate::KeyIn {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not {
            predicate: Box::new(predicate),
        }
    }

    /// Conjunction that flattens nested ANDs and drops `true` constants.
    pub fn and_all(parts: impl IntoIterator<Item = Predicate>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Predicate::Const { value: true } => {}
                Predicate::And { predicates } => flat.extend(predicates),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::always(),
            1 => flat.remove(0),
            _ => Predicate::And { predicates: flat },
        }
    }

    pub fn is_const_false(&self) -> bool {
        matches!(self, Predicate::Const { value: false })
    }

    /// Rewrites every parameter reference in the tree.
    pub fn rename_params(&mut self, f: &impl Fn(&str) -> SmolStr) {
        match self {
            Predicate::Eq { value, .. }
            | Predicate::Neq { value, .. }
            | Predicate::Gt { value, .. }
            | Predicate::Gte { value, .. }
            | Predicate::Lt { value, .. }
            | Predicate::Lte { value, .. } => value.map_param(f),
            Predicate::Like { pattern, .. } => pattern.map_param(f),
            Predicate::And { predicates } | Predicate::Or { predicates } => {
                for p in predicates {
                    p.rename_params(f);
                }
            }
            Predicate::Not { predicate } => predicate.rename_params(f),
            Predicate::Const { .. }
            | Predicate::Prefix { .. }
            | Predicate::In { .. }
            | Predicate::KeyIn { .. }
            | Predicate::IsNull { .. } => {}
        }
    }

    /// Evaluate against one record. Unresolvable parameters never match.
    pub fn matches(&self, record: &Record, params: &QueryParams) -> bool {
        match self {
            Predicate::Const { value } => *value,
            Predicate::And { predicates } => predicates.iter().all(|p| p.matches(record, params)),
            Predicate::Or { predicates } => predicates.iter().any(|p| p.matches(record, params)),
            Predicate::Not { predicate } => !predicate.matches(record, params),
            Predicate::KeyIn { keys } => keys.iter().any(|k| *k == record.key),
            Predicate::IsNull { field } => record.resolve(field).map_or(true, Value::is_null),
            Predicate::Prefix { field, prefix } => match record.resolve(field) {
                Some(Value::Str(s)) => s.starts_with(prefix.as_str()),
                _ => false,
            },
            Predicate::In { field, values } => match record.resolve(field) {
                Some(actual) => values.iter().any(|v| actual.total_cmp(v) == Ordering::Equal),
                None => false,
            },
            Predicate::Like { field, pattern } => {
                let (Some(actual), Some(Value::Str(pattern))) =
                    (record.resolve(field), pattern.resolve(params))
                else {
                    return false;
                };
                match actual.to_text() {
                    Some(text) => like_matches(pattern, &text),
                    None => false,
                }
            }
            Predicate::Eq { field, value }
            | Predicate::Neq { field, value }
            | Predicate::Gt { field, value }
            | Predicate::Gte { field, value }
            | Predicate::Lt { field, value }
            | Predicate::Lte { field, value } => {
                let Some(target) = value.resolve(params) else {
                    return false;
                };
                let Some(actual) = record.resolve(field) else {
                    return matches!(self, Predicate::Neq { .. }) && !target.is_null();
                };
                // SQL-ish null handling: null only equals null.
                if actual.is_null() || target.is_null() {
                    return match self {
                        Predicate::Eq { .. } => actual.is_null() && target.is_null(),
                        Predicate::Neq { .. } => actual.is_null() != target.is_null(),
                        _ => false,
                    };
                }
                let ord = actual.total_cmp(target);
                match self {
                    Predicate::Eq { .. } => ord == Ordering::Equal,
                    Predicate::Neq { .. } => ord != Ordering::Equal,
                    Predicate::Gt { .. } => ord == Ordering::Greater,
                    Predicate::Gte { .. } => ord != Ordering::Less,
                    Predicate::Lt { .. } => ord == Ordering::Less,
                    Predicate::Lte { .. } => ord != Ordering::Greater,
                    _ => false,
                }
            }
        }
    }
}

lazy_static! {
    static ref LIKE_PATTERNS: Mutex<LruCache<SmolStr, Regex>> =
        Mutex::new(LruCache::new(NonZeroUsize::MIN.saturating_add(255)));
}

/// Case-insensitive SQL LIKE match. Compiled patterns are memoized process-wide.
pub fn like_matches(pattern: &str, text: &str) -> bool {
    let key = SmolStr::new(pattern);
    if let Ok(mut cache) = LIKE_PATTERNS.lock() {
        if let Some(re) = cache.get(&key) {
            return re.is_match(text);
        }
        return match compile_like(pattern) {
            Some(re) => {
                let matched = re.is_match(text);
                cache.put(key, re);
                matched
            }
            None => false,
        };
    }
    compile_like(pattern).is_some_and(|re| re.is_match(text))
}

fn compile_like(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push_str("(?is)^");
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn container(key: &str, fields: serde_json::Value) -> Record {
        Record::new("container", key, Value::from(fields))
    }

    fn no_params() -> QueryParams {
        QueryParams::new()
    }

    #[test]
    fn test_comparisons() {
        let r = container("1", json!({"qty": 5, "name": "Pallet"}));
        assert!(Predicate::eq("qty", 5.0).matches(&r, &no_params()));
        assert!(Predicate::Gt { field: "qty".into(), value: Value::from(4.0).into() }.matches(&r, &no_params()));
        assert!(!Predicate::Lt { field: "qty".into(), value: Value::from(5.0).into() }.matches(&r, &no_params()));
        assert!(Predicate::Lte { field: "qty".into(), value: Value::from(5.0).into() }.matches(&r, &no_params()));
        assert!(Predicate::Neq { field: "name".into(), value: Value::str("Box").into() }.matches(&r, &no_params()));
    }

    #[test]
    fn test_null_semantics() {
        let r = container("1", json!({"partner": null}));
        assert!(Predicate::IsNull { field: "partner".into() }.matches(&r, &no_params()));
        assert!(Predicate::IsNull { field: "missing".into() }.matches(&r, &no_params()));
        assert!(!Predicate::Gt { field: "partner".into(), value: Value::from(1.0).into() }.matches(&r, &no_params()));
        assert!(Predicate::Eq { field: "partner".into(), value: Value::Null.into() }.matches(&r, &no_params()));
    }

    #[test]
    fn test_params_are_resolved() {
        let r = container("1", json!({"status": "A"}));
        let pred = Predicate::Eq {
            field: "status".into(),
            value: Operand::param("f.status"),
        };
        let mut params = QueryParams::new();
        assert!(!pred.matches(&r, &params));
        params.insert(SmolStr::new("f.status"), Value::str("A"));
        assert!(pred.matches(&r, &params));
    }

    #[test]
    fn test_like_is_case_insensitive_with_wildcards() {
        assert!(like_matches("%pal%", "Euro PALLET"));
        assert!(like_matches("p_llet", "Pallet"));
        assert!(!like_matches("p_llet", "Paallet"));
        assert!(like_matches("a.b%", "A.B-1"));
        assert!(!like_matches("a.b%", "axb"));
    }

    #[test]
    fn test_and_all_flattens() {
        let p = Predicate::and_all([
            Predicate::always(),
            Predicate::And { predicates: vec![Predicate::eq("a", 1.0), Predicate::eq("b", 2.0)] },
            Predicate::eq("c", 3.0),
        ]);
        match p {
            Predicate::And { predicates } => assert_eq!(predicates.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(Predicate::and_all([]), Predicate::always());
    }

    #[test]
    fn test_rename_params_reaches_nested_nodes() {
        let mut p = Predicate::Or {
            predicates: vec![
                Predicate::not(Predicate::Like { field: "name".into(), pattern: Operand::param("q") }),
                Predicate::Eq { field: "a".into(), value: Operand::param("a") },
            ],
        };
        p.rename_params(&|name| SmolStr::new(format!("search.{name}")));
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("search.q"));
        assert!(json.contains("search.a"));
    }
}
