//! # strata-plan
//!
//! Change plans for the strata migration engine.
//!
//! This crate provides:
//! - The plan model: changes, tags, and pragmas in deployment order
//! - A pest-based parser for `strata.plan` files and a writer that round-trips
//! - Change and tag name validation
//! - Reference parsing (`@tag`, `pkg:change`, `HEAD^2`, ...) and resolution
//! - A [`PlanCache`] for plans read repeatedly during dependency resolution
//!
//! ## Example
//!
//! ```rust
//! use strata_plan::{parse_plan, resolve_token};
//!
//! let plan = parse_plan(
//!     "%project=app\nschema\ntables/users [schema]\n@v1.0\n",
//! ).unwrap();
//!
//! let resolved = resolve_token("@v1.0", &plan, None).unwrap();
//! assert_eq!(resolved.change.as_deref(), Some("tables/users"));
//!
//! let resolved = resolve_token("HEAD^", &plan, None).unwrap();
//! assert_eq!(resolved.change.as_deref(), Some("schema"));
//! ```

pub mod cache;
pub mod error;
pub mod model;
pub mod names;
pub mod parser;
pub mod reference;
pub mod writer;

pub use cache::{CacheStats, PlanCache};
pub use error::{PlanError, PlanResult, ReferenceError, ReferenceResult};
pub use model::{
    Change, PROJECT_PRAGMA, Plan, SYNTAX_VERSION, SYNTAX_VERSION_PRAGMA, Signature, Tag, URI_PRAGMA,
};
pub use names::{
    NameKind, is_valid_change_name, is_valid_tag_name, validate_change_name,
    validate_project_name, validate_tag_name,
};
pub use parser::{parse_plan, parse_plan_file};
pub use reference::{Reference, ResolvedRef, Symbolic, is_content_hash, resolve, resolve_token};
pub use writer::write_plan;
