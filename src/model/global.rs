//! The composed global model.
//!
//! A [`GlobalModel`] owns every variable (shared kinetic parameters first, then one
//! contiguous range per experiment block), every constraint and the objective. It is the
//! single object handed to an NLP backend and, after a solve, the object the stability
//! analysis and the report read from.

use std::{collections::HashMap, ops::Range};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{mechanism::record::RateLawFamily, solver::backend::SolveStatus};

use super::{
    constraint::{Constraint, ConstraintGroup},
    error::ModelError,
    expr::{Expr, VarId},
    variable::Variable,
};

/// Kind of data an experiment block is fitted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    #[default]
    Static,
    Dynamic,
}

/// Bookkeeping of one experiment block inside the global model.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSummary {
    pub id: String,
    pub kind: DataKind,
    /// Node times of dynamic blocks, empty for static ones
    pub times: Vec<f64>,
    pub variables: Range<usize>,
    pub constraints: Range<usize>,
    pub error: VarId,
    /// Enzyme-conservation target per reaction used by this block
    pub enzyme_targets: Vec<(String, f64)>,
    /// Effective time delay applied to the observations
    pub delay: Option<f64>,
}

impl BlockSummary {
    /// Constraint indices of this block belonging to `group`, optionally restricted to one
    /// time node.
    pub fn rows(&self, model: &GlobalModel, group: ConstraintGroup, node: Option<usize>) -> Vec<usize> {
        self.constraints
            .clone()
            .filter(|&i| {
                let c = &model.constraints[i];
                c.group == group && (node.is_none() || c.node == node)
            })
            .collect()
    }
}

/// The global kinetic model: shared parameters, experiment blocks and objective.
#[derive(Debug, Clone)]
pub struct GlobalModel {
    pub name: String,
    family: RateLawFamily,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: Expr,
    parameters: Vec<VarId>,
    blocks: Vec<BlockSummary>,
    index: HashMap<String, VarId>,
    /// Termination status of the last solve
    pub status: Option<SolveStatus>,
    /// Wall-clock seconds of the last solve
    pub solve_time: Option<f64>,
}

impl GlobalModel {
    pub fn new(name: impl Into<String>, family: RateLawFamily) -> Self {
        Self {
            name: name.into(),
            family,
            variables: vec![],
            constraints: vec![],
            objective: Expr::zero(),
            parameters: vec![],
            blocks: vec![],
            index: HashMap::new(),
            status: None,
            solve_time: None,
        }
    }

    pub fn family(&self) -> RateLawFamily {
        self.family
    }

    /// Adds a variable and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateVariable`] if the key is already taken.
    pub fn add_variable(&mut self, variable: Variable) -> Result<VarId, ModelError> {
        if self.index.contains_key(&variable.key) {
            return Err(ModelError::DuplicateVariable(variable.key));
        }

        let id = VarId(self.variables.len());
        if variable.kind.is_kinetic() && variable.block.is_none() {
            self.parameters.push(id);
        }
        self.index.insert(variable.key.clone(), id);
        self.variables.push(variable);
        Ok(id)
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn set_objective(&mut self, objective: Expr) {
        self.objective = objective;
    }

    pub(crate) fn push_block(&mut self, block: BlockSummary) {
        self.blocks.push(block);
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut [Variable] {
        &mut self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &Expr {
        &self.objective
    }

    /// Shared kinetic parameters in declaration order.
    pub fn parameters(&self) -> &[VarId] {
        &self.parameters
    }

    pub fn blocks(&self) -> &[BlockSummary] {
        &self.blocks
    }

    pub fn block(&self, id: &str) -> Option<&BlockSummary> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn id(&self, key: &str) -> Option<VarId> {
        self.index.get(key).copied()
    }

    pub fn variable(&self, key: &str) -> Option<&Variable> {
        self.id(key).map(|id| &self.variables[id.0])
    }

    pub fn variable_mut(&mut self, key: &str) -> Option<&mut Variable> {
        self.id(key).map(move |id| &mut self.variables[id.0])
    }

    /// Current value of the variable with the given key.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.variable(key).map(|v| v.value)
    }

    /// Current values of all variables, indexed by [`VarId`].
    pub fn point(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.value).collect()
    }

    /// Writes a full point back into the variables. Fixed variables are left untouched.
    pub fn set_point(&mut self, point: &[f64]) -> Result<(), ModelError> {
        if point.len() != self.variables.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.variables.len(),
                found: point.len(),
            });
        }

        for (var, value) in self.variables.iter_mut().zip(point) {
            if !var.fixed {
                var.value = *value;
            }
        }
        Ok(())
    }

    pub fn objective_value(&self) -> f64 {
        self.objective.eval(&self.point())
    }

    /// Residual of every constraint at `x`.
    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.constraints.iter().map(|c| c.residual(x)).collect()
    }

    /// Largest absolute constraint residual or bound violation at `x`.
    pub fn max_violation(&self, x: &[f64]) -> f64 {
        let constraints = self
            .constraints
            .iter()
            .map(|c| c.residual(x).abs())
            .fold(0.0, f64::max);
        let bounds = self
            .variables
            .iter()
            .zip(x)
            .map(|(v, value)| v.bound_violation(*value))
            .fold(0.0, f64::max);
        constraints.max(bounds)
    }

    /// Constraints whose residual at the current point exceeds `tolerance`.
    pub fn violated_constraints(&self, tolerance: f64) -> Vec<(&Constraint, f64)> {
        let x = self.point();
        self.constraints
            .iter()
            .map(|c| (c, c.residual(&x)))
            .filter(|(_, r)| r.abs() > tolerance)
            .collect()
    }

    /// Sparse constraint Jacobian at `x` as `(row, column, value)` triplets.
    pub fn jacobian(&self, x: &[f64]) -> Vec<(usize, usize, f64)> {
        self.constraints
            .iter()
            .enumerate()
            .flat_map(|(row, c)| {
                c.body
                    .gradient(x)
                    .into_iter()
                    .filter(|(_, v)| *v != 0.0)
                    .map(move |(col, v)| (row, col.0, v))
            })
            .collect()
    }

    /// Dense Jacobian sub-block for the given constraint rows and variable columns.
    ///
    /// # Arguments
    ///
    /// * `rows` - Constraint indices
    /// * `cols` - Variable ids
    /// * `x` - Point to evaluate at
    pub fn jacobian_block(&self, rows: &[usize], cols: &[VarId], x: &[f64]) -> Array2<f64> {
        let mut block = Array2::zeros((rows.len(), cols.len()));
        for (i, &row) in rows.iter().enumerate() {
            let body = &self.constraints[row].body;
            for (j, col) in cols.iter().enumerate() {
                block[(i, j)] = body.partial(*col, x);
            }
        }
        block
    }

    /// Checks that every expression references existing variables only.
    pub fn validate(&self) -> Result<(), ModelError> {
        let n = self.variables.len();
        for c in &self.constraints {
            if let Some(var) = c.body.variables().into_iter().find(|v| v.0 >= n) {
                return Err(ModelError::DanglingReference {
                    constraint: c.name.clone(),
                    index: var.0,
                });
            }
        }
        if let Some(var) = self.objective.variables().into_iter().find(|v| v.0 >= n) {
            return Err(ModelError::DanglingReference {
                constraint: "objective".into(),
                index: var.0,
            });
        }
        Ok(())
    }
}
