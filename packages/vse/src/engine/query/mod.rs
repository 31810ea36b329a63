pub mod compiled;
pub mod order;
pub mod predicate;
pub mod scope;

use crate::engine::types::Value;
use smol_str::SmolStr;
use std::collections::BTreeMap;

/// Named query parameters. Ordered so compiled queries serialize canonically.
pub type QueryParams = BTreeMap<SmolStr, Value>;

pub use compiled::{CompiledFragment, CompiledQuery};
pub use order::{compare_keys, Direction, OrderBy, SortOrder};
pub use predicate::{like_matches, Operand, Predicate};
pub use scope::SecurityScope;
