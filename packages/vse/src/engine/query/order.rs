use crate::engine::types::{compare_values, Path, Record, RecordKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub field: Path,
    #[serde(default)]
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self {
            field: Path::new(field),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: Path::new(field),
            direction: Direction::Desc,
        }
    }
}

/// Ordered list of sort keys. Ties always fall back to the record key, so a
/// sort order yields one reproducible sequence for any set of records.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[serde(transparent)]
pub struct SortOrder(pub Vec<OrderBy>);

impl SortOrder {
    pub fn by(field: &str) -> Self {
        Self(vec![OrderBy::asc(field)])
    }

    pub fn then(mut self, order: OrderBy) -> Self {
        self.0.push(order);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OrderBy> {
        self.0.iter()
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for order in &self.0 {
            let ord = compare_values(a.resolve(&order.field), b.resolve(&order.field));
            let ord = match order.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        compare_keys(&a.key, &b.key)
    }
}

/// Numeric keys compare numerically, everything else lexicographically.
pub fn compare_keys(a: &RecordKey, b: &RecordKey) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
