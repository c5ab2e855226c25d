use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Variable {0} is declared twice")]
    DuplicateVariable(String),
    #[error("Unknown variable {0}")]
    UnknownVariable(String),
    #[error("Point has wrong length: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Constraint {constraint} references variable index {index} outside the model")]
    DanglingReference { constraint: String, index: usize },
}
