//! Incremental linear constraint solver for Kryon layouts
//!
//! Constraints are affine relations between [`Expression`]s over [`Variable`]s,
//! stratified by [`Priority`]. `Required` constraints are hard; the remaining
//! tiers are minimized lexicographically, so a lower tier never trades against
//! a higher one. The tableau is updated incrementally on every edit.

pub mod constraint;
pub mod expression;
mod row;
pub mod solver;
pub mod strength;
pub mod variable;

pub use constraint::*;
pub use expression::{Expression, Term};
pub use solver::Solver;
pub use strength::*;
pub use variable::*;

/// Coefficients and weights closer to zero than this are treated as zero
pub const EPSILON: f64 = 1.0e-8;

/// Slack allowed when checking whether a solved constraint holds
pub const TOLERANCE: f64 = 1.0e-6;

pub(crate) fn near_zero(value: f64) -> bool {
    value.abs() < EPSILON
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    #[error("Invalid value for {context}: {value}")]
    InvalidValue { context: &'static str, value: f64 },

    #[error("Variable {0} has been removed")]
    StaleVariable(Variable),

    #[error("Variable {0} belongs to a different layout space")]
    ForeignVariable(Variable),

    #[error("Constraint {0} has been destroyed")]
    StaleConstraint(ConstraintHandle),

    #[error("Constraint {0} belongs to a different solver")]
    ForeignConstraint(ConstraintHandle),

    #[error("Variable {variable} is still referenced by {constraints} constraint(s)")]
    VariableInUse { variable: Variable, constraints: usize },

    #[error("Required constraint cannot be satisfied: {constraint}")]
    Unsatisfiable { constraint: String },

    #[error("No values have been derived yet")]
    NotSolved,

    #[error("Internal solver error: {0}")]
    Internal(&'static str),
}

impl SolverError {
    pub fn is_invalid_value(&self) -> bool {
        matches!(self, SolverError::InvalidValue { .. })
    }

    pub fn is_invalid_handle(&self) -> bool {
        matches!(
            self,
            SolverError::StaleVariable(_)
                | SolverError::ForeignVariable(_)
                | SolverError::StaleConstraint(_)
                | SolverError::ForeignConstraint(_)
                | SolverError::VariableInUse { .. }
        )
    }

    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, SolverError::Unsatisfiable { .. })
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
