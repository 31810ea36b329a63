use super::keys::FastMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::fmt;

/// Dynamic field value carried by records, filter parameters and row projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(SmolStr),
    Array(Vec<Value>),
    Object(FastMap<SmolStr, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    /// Get value as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get value as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&FastMap<SmolStr, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get nested value by key (for objects)
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, empty string and empty array count as "no value" for filter parameters.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Str(s) => s.trim().is_empty(),
            Value::Array(arr) => arr.is_empty(),
            _ => false,
        }
    }

    /// Renders scalars the way they are compared in LIKE and full text matching.
    pub fn to_text(&self) -> Option<SmolStr> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(SmolStr::new(if *b { "true" } else { "false" })),
            Value::Number(n) => Some(SmolStr::new(format_number(*n))),
            Value::Str(s) => Some(s.clone()),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(SmolStr::new(s))
    }

    /// Builds an object value from key/value pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<SmolStr>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Total order used for sorting and range predicates.
    ///
    /// Values of different types order by type rank; NaN compares equal.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        compare_values(Some(self), Some(other))
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            other => {
                let json: serde_json::Value = other.clone().into();
                write!(f, "{}", json)
            }
        }
    }
}

/// Compare two values for ordering; a missing value sorts first.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(va), Some(vb)) => match (va, vb) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
            (Value::Number(na), Value::Number(nb)) => {
                na.partial_cmp(nb).unwrap_or(Ordering::Equal)
            }
            (Value::Str(sa), Value::Str(sb)) => sa.cmp(sb),
            (Value::Array(aa), Value::Array(ab)) => {
                for (ia, ib) in aa.iter().zip(ab.iter()) {
                    let cmp = compare_values(Some(ia), Some(ib));
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                }
                aa.len().cmp(&ab.len())
            }
            (Value::Object(oa), Value::Object(ob)) => oa.len().cmp(&ob.len()),
            _ => type_rank(va).cmp(&type_rank(vb)),
        },
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::Str(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::Str(SmolStr::from(s)),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (SmolStr::from(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(val: Value) -> Self {
        match val {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => json!(n),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Array(arr) => serde_json::Value::Array(arr.into_iter().map(|v| v.into()).collect()),
            Value::Object(obj) => serde_json::Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k.to_string(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(SmolStr::new(s))
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
