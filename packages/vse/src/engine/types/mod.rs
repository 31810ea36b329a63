mod handle;
mod keys;
mod path;
mod record;
mod row_id;
mod value;

pub use handle::{SelectionId, ViewHandle};
pub use keys::{EntityType, FastMap, FastSet, RecordKey, RecordRef, TableName};
pub use path::Path;
pub use record::Record;
pub use row_id::{RowId, RowIdParseError};
pub use value::{compare_values, Value};
