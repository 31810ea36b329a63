mod manager;
mod view;

pub use manager::{CreateViewRequest, ViewPage, ViewRegistry};
pub use view::{View, ViewCloseAction, ViewState};
