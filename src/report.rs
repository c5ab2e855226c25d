//! Serializable summary of a solved model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    model::{global::GlobalModel, variable::VarKind},
    stability::StabilityReport,
};

/// Residuals above this magnitude are listed as violated.
pub const VIOLATION_TOLERANCE: f64 = 1e-6;

/// Values of one experiment block at the solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockReport {
    pub id: String,
    /// Weighted sum of squared residuals of the block
    pub error: f64,
    pub delay: Option<f64>,
    pub concentrations: BTreeMap<String, f64>,
    pub enzymes: BTreeMap<String, f64>,
    pub rates: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub constraint: String,
    pub residual: f64,
}

/// Fitted parameters, per-block values and diagnostics of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionReport {
    pub model: String,
    pub status: String,
    pub seed: Option<u64>,
    pub objective: f64,
    pub solve_time: Option<f64>,
    pub parameters: BTreeMap<String, f64>,
    pub blocks: Vec<BlockReport>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stability: Option<StabilityReport>,
}

impl SolutionReport {
    /// Collects the current values of `model`.
    pub fn from_model(model: &GlobalModel, stability: Option<StabilityReport>) -> Self {
        let variables = model.variables();
        let parameters = model
            .parameters()
            .iter()
            .map(|id| (variables[id.0].key.clone(), variables[id.0].value))
            .collect();

        let blocks = model
            .blocks()
            .iter()
            .map(|block| {
                let mut report = BlockReport {
                    id: block.id.clone(),
                    error: variables[block.error.0].value,
                    delay: block.delay,
                    concentrations: BTreeMap::new(),
                    enzymes: BTreeMap::new(),
                    rates: BTreeMap::new(),
                };
                for var in &variables[block.variables.clone()] {
                    let target = match var.kind {
                        VarKind::Concentration => &mut report.concentrations,
                        VarKind::EnzymeFraction => &mut report.enzymes,
                        VarKind::Rate => &mut report.rates,
                        _ => continue,
                    };
                    target.insert(var.key.clone(), var.value);
                }
                report
            })
            .collect();

        let violations = model
            .violated_constraints(VIOLATION_TOLERANCE)
            .into_iter()
            .map(|(c, residual)| Violation {
                constraint: c.name.clone(),
                residual,
            })
            .collect();

        Self {
            model: model.name.clone(),
            status: model
                .status
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unsolved".into()),
            seed: None,
            objective: model.objective_value(),
            solve_time: model.solve_time,
            parameters,
            blocks,
            violations,
            stability,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sum of the block errors.
    pub fn total_error(&self) -> f64 {
        self.blocks.iter().map(|b| b.error).sum()
    }
}
