//! Quadratic-penalty backend over argmin's L-BFGS.
//!
//! Equality constraints and variable bounds are moved into the objective as squared
//! penalties whose weight grows tenfold per round. Fixed variables and variables whose
//! bounds coincide are removed from the search space.

use std::sync::Arc;

use argmin::core::observers::ObserverMode;
use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS as ArgminLBFGS;
use argmin_math as _;
use argmin_observer_slog::SlogLogger;
use log::{debug, info};
use ndarray::Array1;

use crate::model::{constraint::Constraint, expr::Expr, variable::Variable};

use super::{
    backend::{NlpBackend, SolveStatus, SolverOutput},
    error::SolverError,
};

/// Penalty-method NLP backend.
#[derive(Debug, Clone, bon::Builder)]
pub struct PenaltyLbfgs {
    /// Largest accepted constraint residual or bound violation
    #[builder(default = 1e-6)]
    tolerance: f64,
    /// L-BFGS iterations per penalty round
    #[builder(default = 500)]
    max_iters: u64,
    #[builder(default = 8)]
    rounds: usize,
    /// Penalty weight of the first round
    #[builder(default = 10.0)]
    initial_weight: f64,
    /// L-BFGS history size
    #[builder(default = 7)]
    memory: usize,
    /// Line search parameter c1 (sufficient decrease condition)
    #[builder(default = 1e-4)]
    c1: f64,
    /// Line search parameter c2 (curvature condition)
    #[builder(default = 0.9)]
    c2: f64,
    /// Attach a terminal logger to every round
    #[builder(default)]
    verbose: bool,
    #[builder(skip)]
    variables: Vec<Variable>,
    #[builder(skip)]
    constraints: Vec<Expr>,
    #[builder(skip = Expr::zero())]
    objective: Expr,
}

impl Default for PenaltyLbfgs {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl NlpBackend for PenaltyLbfgs {
    fn declare_variables(&mut self, variables: &[Variable]) {
        self.variables = variables.to_vec();
    }

    fn declare_constraints(&mut self, constraints: &[Constraint]) {
        self.constraints = constraints.iter().map(|c| c.body.clone()).collect();
    }

    fn minimize(&mut self, objective: &Expr) {
        self.objective = objective.clone();
    }

    fn solve(&mut self) -> Result<SolverOutput, SolverError> {
        if self.variables.is_empty() {
            return Err(SolverError::NoVariables);
        }
        for var in &self.variables {
            if let (Some(lower), Some(upper)) = (var.lower, var.upper) {
                if lower > upper {
                    return Err(SolverError::EmptyDomain {
                        name: var.key.clone(),
                        lower,
                        upper,
                    });
                }
            }
        }

        let base: Vec<f64> = self
            .variables
            .iter()
            .map(|v| match (v.fixed, v.is_pinned()) {
                (true, _) => v.value,
                (false, true) => v.lower.unwrap_or(v.value),
                (false, false) => v.clamp(v.value),
            })
            .collect();
        let free: Vec<usize> = self
            .variables
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.fixed && !v.is_pinned())
            .map(|(i, _)| i)
            .collect();

        let mut positions = vec![None; self.variables.len()];
        for (pos, &i) in free.iter().enumerate() {
            positions[i] = Some(pos);
        }

        let data = Arc::new(PenaltyData {
            objective: self.objective.clone(),
            constraints: self.constraints.clone(),
            lower: self.variables.iter().map(|v| v.lower).collect(),
            upper: self.variables.iter().map(|v| v.upper).collect(),
            base,
            free,
            positions,
        });

        let mut params: Array1<f64> = data.free.iter().map(|&i| data.base[i]).collect();
        let mut iterations = 0;
        let mut exhausted = false;
        let mut weight = self.initial_weight;

        for round in 0..self.rounds {
            if data.free.is_empty() {
                break;
            }

            let problem = PenaltyProblem {
                data: Arc::clone(&data),
                weight,
            };
            let linesearch = MoreThuenteLineSearch::new()
                .with_c(self.c1, self.c2)
                .map_err(|e| SolverError::Backend(e.to_string()))?;
            let solver = ArgminLBFGS::new(linesearch, self.memory);

            let start = params.clone();
            let max_iters = self.max_iters;
            let mut executor = Executor::new(problem, solver)
                .configure(|state| state.param(start).max_iters(max_iters));
            if self.verbose {
                executor = executor.add_observer(SlogLogger::term(), ObserverMode::Always);
            }

            match executor.run() {
                Ok(res) => {
                    iterations += res.state.get_iter();
                    exhausted = matches!(
                        res.state.get_termination_status(),
                        TerminationStatus::Terminated(TerminationReason::MaxItersReached)
                    );
                    if let Some(best) = res.state.get_best_param() {
                        params = best.clone();
                    }
                }
                Err(e) => debug!("Penalty round {round} stopped early: {e}"),
            }

            let violation = data.violation(&data.point(&params));
            debug!("Penalty round {round}: weight {weight:e}, violation {violation:e}");
            if violation <= self.tolerance {
                break;
            }
            weight *= 10.0;
        }

        // Project back onto the bounds
        let mut values = data.point(&params);
        for &i in &data.free {
            values[i] = self.variables[i].clamp(values[i]);
        }

        let objective = self.objective.eval(&values);
        if !objective.is_finite() {
            return Err(SolverError::NonFiniteObjective);
        }

        let violation = data.violation(&values);
        let status = if violation <= self.tolerance {
            SolveStatus::Optimal
        } else if exhausted {
            SolveStatus::MaxIterations
        } else {
            SolveStatus::Infeasible
        };

        info!("Penalty solve finished: {status}, objective {objective:e}, violation {violation:e}");

        Ok(SolverOutput {
            status,
            values,
            objective,
            iterations,
        })
    }
}

/// Immutable problem data shared by all penalty rounds.
#[derive(Debug)]
struct PenaltyData {
    objective: Expr,
    constraints: Vec<Expr>,
    lower: Vec<Option<f64>>,
    upper: Vec<Option<f64>>,
    /// Starting point, holds the values of fixed variables
    base: Vec<f64>,
    free: Vec<usize>,
    /// Position of each variable in the free vector
    positions: Vec<Option<usize>>,
}

impl PenaltyData {
    fn point(&self, params: &Array1<f64>) -> Vec<f64> {
        let mut x = self.base.clone();
        for (p, &i) in params.iter().zip(&self.free) {
            x[i] = *p;
        }
        x
    }

    fn bound_residual(&self, i: usize, value: f64) -> f64 {
        if let Some(l) = self.lower[i] {
            if value < l {
                return value - l;
            }
        }
        if let Some(u) = self.upper[i] {
            if value > u {
                return value - u;
            }
        }
        0.0
    }

    fn violation(&self, x: &[f64]) -> f64 {
        let constraints = self
            .constraints
            .iter()
            .map(|c| c.eval(x).abs())
            .fold(0.0, f64::max);
        let bounds = (0..x.len())
            .map(|i| self.bound_residual(i, x[i]).abs())
            .fold(0.0, f64::max);
        constraints.max(bounds)
    }
}

#[derive(Debug, Clone)]
struct PenaltyProblem {
    data: Arc<PenaltyData>,
    weight: f64,
}

impl CostFunction for PenaltyProblem {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let data = &self.data;
        let x = data.point(params);

        let residuals: f64 = data.constraints.iter().map(|c| c.eval(&x).powi(2)).sum();
        let bounds: f64 = data
            .free
            .iter()
            .map(|&i| data.bound_residual(i, x[i]).powi(2))
            .sum();

        let cost = data.objective.eval(&x) + self.weight * (residuals + bounds);
        if cost.is_finite() {
            Ok(cost)
        } else {
            Err(argmin::core::Error::msg("penalty cost is not finite"))
        }
    }
}

impl Gradient for PenaltyProblem {
    type Param = Array1<f64>;
    type Gradient = Array1<f64>;

    fn gradient(&self, params: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let data = &self.data;
        let x = data.point(params);
        let mut grad = Array1::zeros(params.len());

        for (var, d) in data.objective.gradient(&x) {
            if let Some(pos) = data.positions[var.0] {
                grad[pos] += d;
            }
        }

        for body in &data.constraints {
            let r = body.eval(&x);
            if r == 0.0 {
                continue;
            }
            for (var, d) in body.gradient(&x) {
                if let Some(pos) = data.positions[var.0] {
                    grad[pos] += 2.0 * self.weight * r * d;
                }
            }
        }

        for (pos, &i) in data.free.iter().enumerate() {
            grad[pos] += 2.0 * self.weight * data.bound_residual(i, x[i]);
        }

        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{expr::VarId, variable::VarKind};
    use approx::assert_relative_eq;
    use finitediff::FiniteDiff;

    fn x(i: usize) -> Expr {
        Expr::var(VarId(i))
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let data = Arc::new(PenaltyData {
            objective: (x(0) - 1.0).powi(2) + x(1) * x(2),
            constraints: vec![x(0) * x(1) - 2.0],
            lower: vec![Some(0.0), None, None],
            upper: vec![None, Some(1.0), None],
            base: vec![0.0, 0.0, 3.0],
            free: vec![0, 1],
            positions: vec![Some(0), Some(1), None],
        });
        let problem = PenaltyProblem { data, weight: 10.0 };

        let params = Array1::from(vec![-0.5, 1.5]);
        let analytic = problem.gradient(&params).unwrap();
        let numeric = params.central_diff(&|p: &Array1<f64>| problem.cost(p).unwrap());

        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert_relative_eq!(a, n, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_fixed_variables_are_untouched() {
        let mut fixed = Variable::new("y", VarKind::Rate);
        fixed.fix(2.0);
        let free = Variable::new("x", VarKind::Rate);

        let mut backend = PenaltyLbfgs::default();
        backend.declare_variables(&[free, fixed]);
        backend.declare_constraints(&[]);
        backend.minimize(&(x(0) - x(1)).powi(2));

        let output = backend.solve().unwrap();
        assert_eq!(output.values[1], 2.0);
        assert_relative_eq!(output.values[0], 2.0, epsilon = 1e-5);
        assert_eq!(output.status, SolveStatus::Optimal);
    }
}
