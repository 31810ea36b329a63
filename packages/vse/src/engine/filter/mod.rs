pub mod barcode;
pub mod compiler;
pub mod default;
pub mod fulltext;
pub mod ids;
pub mod model;

pub use barcode::{BarcodeFilterCompiler, BARCODE_PARAM};
pub use compiler::{compile_filters, CompileContext, FilterCompiler};
pub use default::DefaultFilterCompiler;
pub use fulltext::{FullTextFilterCompiler, FIELDS_INTERNAL, TEXT_PARAM};
pub use ids::{IdsFilterCompiler, IdsFilterData, IDS_FILTER_ID};
pub use model::{
    AutoValue, Filter, FilterDescriptor, FilterOperator, FilterParam, FilterParamDescriptor,
};
