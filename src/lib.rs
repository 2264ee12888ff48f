//! tabrelay: cross-context message relay and script dispatch
//!
//! A caller (side panel) reaches a remote page context through a coordinator that tracks
//! which remotes have confirmed readiness, probes and retries when they have not, and
//! runs arbitrary page scripts through a structured fast path with an inline-element
//! fallback. Each context is a tokio task; the channels between them are traits so the
//! host environment can be swapped out.

pub mod backoff;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod pending;
pub mod readiness;
pub mod relay;
pub mod remote;
pub mod script;
pub mod sender;
pub mod transport;
pub mod types;

pub use error::{ErrorKind, RelayError, TransportError};
pub use relay::{RelayCoordinator, RelayHandle, RelayService};
pub use sender::RetryingSender;
pub use types::{Command, ContextId, ExecutionOutcome, Outcome, RelayRequest};
