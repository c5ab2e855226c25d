use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("No variables were declared")]
    NoVariables,
    #[error("Variable {name} has an empty domain [{lower}, {upper}]")]
    EmptyDomain { name: String, lower: f64, upper: f64 },
    #[error("Objective evaluated to a non-finite value")]
    NonFiniteObjective,
    #[error("Backend failed: {0}")]
    Backend(String),
}
