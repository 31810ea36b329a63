pub mod bounded;
pub mod records;

pub use bounded::BoundedCache;
pub use records::RecordCache;
