pub mod expand;
pub mod kind;
pub mod row;

pub use expand::{
    ExpansionContext, MaterializedPage, RowFailure, RowMaterializer, RowProcessedPredicate, BEST_BEFORE_FIELD,
    PLACEHOLDER, PRODUCT_FIELD, QTY_FIELD, STATUS_DISPLAY_FIELD, UOM_FIELD,
};
pub use kind::RowKind;
pub use row::{Row, RowBuilder, RowChangeRequest, RowIter};
