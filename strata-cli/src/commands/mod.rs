//! Command implementations.

pub mod context;
pub mod edit;
pub mod migrate;
pub mod plan;
pub mod status;

pub use context::{Context, Database, Engine};
