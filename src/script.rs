//! Script execution inside a remote page.
//!
//! [`classifier`] picks a path, [`structured`] and [`inline`] implement the two paths,
//! [`runner`] chains them, and [`value`] turns whatever came back into one string.

pub mod classifier;
pub mod inline;
pub mod lexer;
pub mod realm;
pub mod runner;
pub mod structured;
pub mod value;

pub use classifier::{classify, Classification, ScriptKind, Strategy};
pub use realm::{InjectionFailure, PageInfo, PageRealm, ScriptElement, StorageArea, StorageChange};
pub use runner::{ExecutionPath, ScriptRun, ScriptRunner};
pub use value::{canonicalize, RemoteValue};
