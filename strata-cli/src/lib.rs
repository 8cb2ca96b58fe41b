//! strata CLI - command-line interface for strata migrations.
//!
//! Deploys, reverts, and verifies packages against PostgreSQL, and edits
//! package plans. Everything but `plan`, `add`, and `tag` needs a database.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
