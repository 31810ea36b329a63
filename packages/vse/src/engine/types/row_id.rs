//! Row identifier codec.
//!
//! A row is either a root record, a record nested below a top level record,
//! or a derived product-storage line of some container. The string form
//! escapes `\` and `/` inside each component and joins components with `/`,
//! so the number of unescaped separators tells the variant apart and
//! `decode(encode(x)) == x` holds for every value, including empty keys.

use super::keys::RecordKey;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '/';
const ESCAPE: char = '\\';

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowId {
    /// A root record addressed by its own key.
    Record(RecordKey),
    /// A record included (directly or transitively) in a top level record.
    Nested { top: RecordKey, key: RecordKey },
    /// A product storage line of `container`, shown below `top`.
    Storage {
        top: RecordKey,
        container: RecordKey,
        product: RecordKey,
    },
}

impl RowId {
    pub fn record(key: impl Into<RecordKey>) -> Self {
        RowId::Record(key.into())
    }

    /// Row id of `key` when shown below `top`; a record shown below itself is a root.
    pub fn nested(top: Option<&RecordKey>, key: impl Into<RecordKey>) -> Self {
        let key = key.into();
        match top {
            Some(top) if *top != key => RowId::Nested {
                top: top.clone(),
                key,
            },
            _ => RowId::Record(key),
        }
    }

    pub fn storage(
        top: impl Into<RecordKey>,
        container: impl Into<RecordKey>,
        product: impl Into<RecordKey>,
    ) -> Self {
        RowId::Storage {
            top: top.into(),
            container: container.into(),
            product: product.into(),
        }
    }

    /// Key of the record that backs this row.
    pub fn record_key(&self) -> &RecordKey {
        match self {
            RowId::Record(key) => key,
            RowId::Nested { key, .. } => key,
            RowId::Storage { container, .. } => container,
        }
    }

    /// Key of the root record this row belongs to.
    pub fn top_level_key(&self) -> &RecordKey {
        match self {
            RowId::Record(key) => key,
            RowId::Nested { top, .. } => top,
            RowId::Storage { top, .. } => top,
        }
    }

    pub fn is_top_level(&self) -> bool {
        matches!(self, RowId::Record(_))
    }

    pub fn encode(&self) -> SmolStr {
        let mut out = String::new();
        match self {
            RowId::Record(key) => escape_into(key, &mut out),
            RowId::Nested { top, key } => {
                escape_into(top, &mut out);
                out.push(SEPARATOR);
                escape_into(key, &mut out);
            }
            RowId::Storage {
                top,
                container,
                product,
            } => {
                escape_into(top, &mut out);
                out.push(SEPARATOR);
                escape_into(container, &mut out);
                out.push(SEPARATOR);
                escape_into(product, &mut out);
            }
        }
        SmolStr::new(out)
    }

    pub fn decode(s: &str) -> Result<Self, RowIdParseError> {
        let mut parts: Vec<String> = vec![String::new()];
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            match c {
                ESCAPE => match chars.next() {
                    Some(escaped @ (ESCAPE | SEPARATOR)) => {
                        if let Some(last) = parts.last_mut() {
                            last.push(escaped);
                        }
                    }
                    _ => return Err(RowIdParseError(s.to_string())),
                },
                SEPARATOR => parts.push(String::new()),
                other => {
                    if let Some(last) = parts.last_mut() {
                        last.push(other);
                    }
                }
            }
        }

        let mut parts = parts.into_iter().map(SmolStr::from);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(key), None, None, None) => Ok(RowId::Record(key)),
            (Some(top), Some(key), None, None) => Ok(RowId::Nested { top, key }),
            (Some(top), Some(container), Some(product), None) => Ok(RowId::Storage {
                top,
                container,
                product,
            }),
            _ => Err(RowIdParseError(s.to_string())),
        }
    }
}

fn escape_into(component: &str, out: &mut String) {
    for c in component.chars() {
        if c == ESCAPE || c == SEPARATOR {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIdParseError(pub String);

impl fmt::Display for RowIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed row id '{}'", self.0)
    }
}

impl std::error::Error for RowIdParseError {}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for RowId {
    type Err = RowIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RowId::decode(s)
    }
}

impl From<&str> for RowId {
    /// Treats the whole string as a plain record key (no decoding).
    fn from(key: &str) -> Self {
        RowId::Record(SmolStr::new(key))
    }
}

impl Serialize for RowId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        RowId::decode(&s).map_err(serde::de::Error::custom)
    }
}
