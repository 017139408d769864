use thiserror::Error;

use crate::properties::Convention;

/// Result type used across the optimizer.
///
/// Typed failures are raised as [`OptError`] and can be recovered with
/// `err.downcast_ref::<OptError>()`.
pub type OptResult<T> = anyhow::Result<T>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptError {
    #[error("Rule description must be unique, a different rule is already registered as '{description}'")]
    DuplicateRule { description: String },
    #[error("Malformed operand in rule '{rule}': {reason}")]
    InvalidOperand { rule: String, reason: String },
    #[error("Invalid heuristic program: {0}")]
    InvalidProgram(String),
    #[error("No rule registered with description '{0}'")]
    UnknownRule(String),
    #[error("Table '{0}' not found in catalog")]
    UnknownTable(String),
    #[error("Exceeded rule-firing budget of {limit} rule calls")]
    RuleFiringBudgetExceeded { limit: usize },
    #[error("Plan incomplete: cannot implement {node} in convention {convention}")]
    PlanIncomplete { convention: Convention, node: String },
    #[error("No plan found for convention {convention}: {reason}")]
    NoPlan { convention: Convention, reason: String },
    #[error("No converter path from convention {from} to {to}")]
    NoConverterPath { from: Convention, to: Convention },
    #[error("Row type changed by rewrite, expected {expected}, got {actual}")]
    RowTypeMismatch { expected: String, actual: String },
    #[error("Invalid cost: {0}")]
    InvalidCost(String),
    #[error("Execution error: {0}")]
    Execution(String),
}
