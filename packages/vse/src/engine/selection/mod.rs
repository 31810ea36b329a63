mod cancel;
mod data;
mod store;

pub use cancel::CancellationToken;
pub use data::SelectionPage;
pub use store::{OrderedSelection, SelectionStats, SelectionStore};
