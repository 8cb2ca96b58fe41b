//! Pest grammar for plan lines.

use pest_derive::Parser;

/// The plan line parser.
#[derive(Parser)]
#[grammar = "parser/plan.pest"]
pub struct PlanParser;
