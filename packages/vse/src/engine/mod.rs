pub mod attributes;
pub mod binding;
pub mod cache;
pub mod filter;
pub mod invalidation;
pub mod materializer;
pub mod query;
pub mod registry;
pub mod selection;
pub mod store;
pub mod types;
