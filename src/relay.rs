//! Relay: coordinator logic and the service task that hosts it.

pub mod coordinator;
pub mod service;

pub use coordinator::RelayCoordinator;
pub use service::{RelayHandle, RelayMessage, RelayService};
