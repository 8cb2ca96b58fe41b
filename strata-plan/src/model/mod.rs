//! Plan model types.

mod change;
mod plan;

pub use change::{Change, Signature, Tag};
pub use plan::{PROJECT_PRAGMA, Plan, SYNTAX_VERSION, SYNTAX_VERSION_PRAGMA, URI_PRAGMA};
