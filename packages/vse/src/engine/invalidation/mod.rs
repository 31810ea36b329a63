pub mod batch;
pub mod dispatcher;

pub use batch::{ChangeBatch, ChangeNotification, ChildScope};
pub use dispatcher::{DispatcherHandle, InvalidationDispatcher, InvalidationListener, UnitOfWork};
