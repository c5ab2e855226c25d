//! Post-solve local stability diagnostics.
//!
//! For every block (and every time node of dynamic blocks) the Jacobian of the forward and
//! reverse elemental-rate constraints with respect to the shared rate constants is formed
//! at the solution, and its eigenvalues are classified by the sign of their real part.

use log::{info, warn};
use nalgebra::{linalg::Schur, Complex, DMatrix};
use serde::{Deserialize, Serialize};

use crate::{
    mechanism::record::RateLawFamily,
    model::{
        constraint::ConstraintGroup,
        expr::VarId,
        global::{BlockSummary, GlobalModel},
        variable::VarKind,
    },
};

/// Real part above which an eigenvalue counts as positive.
pub const DEFAULT_THRESHOLD: f64 = 1e-3;

const SCHUR_EPS: f64 = 1e-12;
const SCHUR_MAX_ITER: usize = 10_000;

/// Eigenvalue counts by sign of the real part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EigenCounts {
    pub positive: usize,
    pub negative: usize,
    pub zero: usize,
}

/// Classifies eigenvalues against a symmetric threshold around zero.
pub fn classify(eigenvalues: &[Complex<f64>], threshold: f64) -> EigenCounts {
    eigenvalues
        .iter()
        .fold(EigenCounts::default(), |mut counts, ev| {
            if ev.re > threshold {
                counts.positive += 1;
            } else if ev.re < -threshold {
                counts.negative += 1;
            } else {
                counts.zero += 1;
            }
            counts
        })
}

/// Eigenvalues of a square matrix, `None` if it is not square or the Schur iteration fails.
pub fn eigenvalues(matrix: &DMatrix<f64>) -> Option<Vec<Complex<f64>>> {
    if !matrix.is_square() {
        return None;
    }
    if matrix.is_empty() {
        return Some(vec![]);
    }
    Schur::try_new(matrix.clone(), SCHUR_EPS, SCHUR_MAX_ITER)
        .map(|schur| schur.complex_eigenvalues().iter().copied().collect())
}

/// Stability of one block, or of one time node of a dynamic block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockStability {
    pub block: String,
    pub time: Option<f64>,
    /// `(re, im)` pairs
    pub eigenvalues: Vec<(f64, f64)>,
    pub counts: EigenCounts,
}

impl BlockStability {
    pub fn is_stable(&self) -> bool {
        self.counts.positive == 0
    }
}

/// Stability classification of a solved model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub threshold: f64,
    pub stable: bool,
    pub blocks: Vec<BlockStability>,
}

/// Eigen-analysis of the elemental rate Jacobian.
#[derive(Debug, Clone, Copy)]
pub struct StabilityAnalyzer {
    threshold: f64,
}

impl Default for StabilityAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl StabilityAnalyzer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Analyses a solved model.
    ///
    /// Returns `None` when the last solve was not optimal or the model does not use
    /// elemental rate laws. The analysis never fails a run.
    pub fn analyze(&self, model: &GlobalModel) -> Option<StabilityReport> {
        if !model.status.as_ref().is_some_and(|s| s.is_optimal()) {
            info!("Skipping stability analysis: solve was not optimal");
            return None;
        }
        if model.family() != RateLawFamily::Elemental {
            info!(
                "Stability analysis is not applicable to {} rate laws",
                model.family()
            );
            return None;
        }

        let columns: Vec<VarId> = [VarKind::ForwardConstant, VarKind::ReverseConstant]
            .into_iter()
            .flat_map(|kind| {
                model
                    .parameters()
                    .iter()
                    .copied()
                    .filter(move |id| model.variables()[id.0].kind == kind)
                    .collect::<Vec<_>>()
            })
            .collect();

        let x = model.point();
        let mut blocks = vec![];
        for block in model.blocks() {
            let nodes: Vec<Option<usize>> = if block.times.is_empty() {
                vec![None]
            } else {
                (0..block.times.len()).map(Some).collect()
            };
            for node in nodes {
                if let Some(result) = self.analyze_node(model, block, node, &columns, &x) {
                    blocks.push(result);
                }
            }
        }

        let stable = blocks.iter().all(BlockStability::is_stable);
        info!(
            "Solution is locally {}",
            if stable { "stable" } else { "unstable" }
        );

        Some(StabilityReport {
            threshold: self.threshold,
            stable,
            blocks,
        })
    }

    fn analyze_node(
        &self,
        model: &GlobalModel,
        block: &BlockSummary,
        node: Option<usize>,
        columns: &[VarId],
        x: &[f64],
    ) -> Option<BlockStability> {
        let rows: Vec<usize> = block
            .rows(model, ConstraintGroup::ForwardRate, node)
            .into_iter()
            .chain(block.rows(model, ConstraintGroup::ReverseRate, node))
            .collect();

        let jacobian = model.jacobian_block(&rows, columns, x);
        let matrix = DMatrix::from_fn(jacobian.nrows(), jacobian.ncols(), |i, j| jacobian[(i, j)]);

        let Some(eigenvalues) = eigenvalues(&matrix) else {
            warn!(
                "Could not compute eigenvalues of block {} ({}x{} Jacobian)",
                block.id,
                matrix.nrows(),
                matrix.ncols()
            );
            return None;
        };

        Some(BlockStability {
            block: block.id.clone(),
            time: node.map(|k| block.times[k]),
            counts: classify(&eigenvalues, self.threshold),
            eigenvalues: eigenvalues.iter().map(|ev| (ev.re, ev.im)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_threshold() {
        let eigs = [
            Complex::new(2e-3, 0.0),
            Complex::new(5e-4, 1.0),
            Complex::new(-1.0, 0.0),
        ];
        let counts = classify(&eigs, DEFAULT_THRESHOLD);
        assert_eq!(
            counts,
            EigenCounts {
                positive: 1,
                negative: 1,
                zero: 1
            }
        );
    }

    #[test]
    fn test_non_square_is_skipped() {
        let matrix = DMatrix::<f64>::zeros(2, 3);
        assert!(eigenvalues(&matrix).is_none());
    }
}
