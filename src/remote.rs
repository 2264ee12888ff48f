//! Remote-context side: the readiness responder and its action handlers.

pub mod handlers;
pub mod monitor;
pub mod responder;

pub use handlers::{ActionHandler, HandlerRegistry};
pub use monitor::StorageChangeLog;
pub use responder::RemoteResponder;
