//! The contract between the engine and an external NLP solver.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{constraint::Constraint, expr::Expr, variable::Variable};

use super::error::SolverError;

/// Termination status of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    MaxIterations,
    /// The backend returned an error or panicked
    Failed(String),
}

impl SolveStatus {
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "optimal"),
            SolveStatus::Infeasible => write!(f, "infeasible"),
            SolveStatus::MaxIterations => write!(f, "max_iterations"),
            SolveStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Result of a backend solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    pub status: SolveStatus,
    /// Value of every declared variable, in declaration order
    pub values: Vec<f64>,
    pub objective: f64,
    pub iterations: u64,
}

/// A nonlinear programming backend.
///
/// The engine declares the variables, then the equality constraints, then the objective to
/// minimize, and finally asks for a blocking solve. Expressions index variables by their
/// position in the declared slice.
pub trait NlpBackend {
    fn declare_variables(&mut self, variables: &[Variable]);

    fn declare_constraints(&mut self, constraints: &[Constraint]);

    fn minimize(&mut self, objective: &Expr);

    fn solve(&mut self) -> Result<SolverOutput, SolverError>;
}
