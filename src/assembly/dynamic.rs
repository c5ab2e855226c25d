//! Time discretization of dynamic experiments.
//!
//! Observed times are shifted by the experiment's time delay, rounded, and merged with
//! `t = 0` into a grid that is refined by bisection until it has the requested number of
//! finite elements. Mass balances are written as backward differences over that grid.

use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{
    model::{
        constraint::{Constraint, ConstraintGroup},
        expr::Expr,
    },
    network::MetabolicNetwork,
};

use super::error::AssemblyError;

/// Finite elements per distinct observed time point.
pub const DEFAULT_DENSITY: usize = 2;

/// Decimals kept when aligning shifted time points.
pub const DEFAULT_TIME_PRECISION: u32 = 3;

/// Record of a time delay that had to be reduced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayClamp {
    pub requested: f64,
    pub applied: f64,
}

/// One observed time point and the grid node it lands on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Time as given in the dataset
    pub time: f64,
    /// Time after the delay shift
    pub shifted: f64,
    pub node: usize,
}

/// Discretized time domain of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    /// Node times, ascending, starting at 0
    pub nodes: Vec<f64>,
    pub observations: Vec<Observation>,
    /// Delay actually applied
    pub delay: f64,
    pub clamp: Option<DelayClamp>,
}

impl TimeGrid {
    /// Number of finite elements.
    pub fn elements(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// Whether the observed times were shifted, which requires an explicit `t = 0` anchor.
    pub fn is_shifted(&self) -> bool {
        self.delay != 0.0
    }

    /// Node of an observed (unshifted) time.
    pub fn node_of(&self, time: f64) -> Option<usize> {
        self.observations
            .iter()
            .find(|o| o.time == time)
            .map(|o| o.node)
    }

    /// Step width of the element ending at node `k`.
    pub fn step(&self, k: usize) -> f64 {
        self.nodes[k] - self.nodes[k - 1]
    }
}

/// Builds time grids for dynamic experiments.
#[derive(Debug, Clone, bon::Builder)]
pub struct DynamicDiscretizer {
    #[builder(default = DEFAULT_DENSITY)]
    density: usize,
    #[builder(default = DEFAULT_TIME_PRECISION)]
    precision: u32,
}

impl Default for DynamicDiscretizer {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DynamicDiscretizer {
    /// Discretizes the observed times of one experiment.
    ///
    /// A delay larger than the earliest observed time is reduced to exactly that time, so
    /// no node is ever negative.
    ///
    /// # Arguments
    ///
    /// * `experiment` - Experiment id, used in messages
    /// * `times` - Observed time points
    /// * `delay` - Requested time delay
    ///
    /// # Returns
    ///
    /// * `Result<TimeGrid, AssemblyError>` - The grid, or an error if the horizon is empty
    pub fn discretize(
        &self,
        experiment: &str,
        times: &[f64],
        delay: f64,
    ) -> Result<TimeGrid, AssemblyError> {
        let distinct: BTreeSet<OrderedFloat<f64>> = times.iter().map(|t| OrderedFloat(*t)).collect();
        let first = distinct
            .first()
            .map(|t| t.0)
            .ok_or_else(|| AssemblyError::EmptyGrid(experiment.to_string()))?;

        let mut clamp = None;
        let mut applied = delay;
        if delay > first {
            warn!(
                "Time delay {delay} of experiment {experiment} exceeds its first time point {first}. Using {first} instead"
            );
            applied = first;
            clamp = Some(DelayClamp {
                requested: delay,
                applied,
            });
        }

        let shifted: BTreeSet<OrderedFloat<f64>> = distinct
            .iter()
            .map(|t| OrderedFloat(self.round(t.0 - applied)))
            .collect();

        let mut points: BTreeSet<OrderedFloat<f64>> = shifted.clone();
        points.insert(OrderedFloat(0.0));
        let mut nodes: Vec<f64> = points.into_iter().map(|t| t.0).collect();

        if nodes.last().copied().unwrap_or(0.0) <= 0.0 {
            return Err(AssemblyError::EmptyGrid(experiment.to_string()));
        }

        // A shifted experiment carries the explicit t = 0 anchor as one more time point
        let anchored = applied != 0.0;
        let target = (self.density * (shifted.len() + usize::from(anchored))).max(1);
        while nodes.len() - 1 < target {
            let (widest, _) = nodes
                .windows(2)
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |(best, width), (i, w)| {
                    if w[1] - w[0] > width {
                        (i, w[1] - w[0])
                    } else {
                        (best, width)
                    }
                });
            let mid = 0.5 * (nodes[widest] + nodes[widest + 1]);
            nodes.insert(widest + 1, mid);
        }

        let positions: BTreeMap<OrderedFloat<f64>, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, t)| (OrderedFloat(*t), i))
            .collect();

        let observations = times
            .iter()
            .map(|&time| {
                let shifted = self.round(time - applied);
                Observation {
                    time,
                    shifted,
                    node: positions[&OrderedFloat(shifted)],
                }
            })
            .collect();

        Ok(TimeGrid {
            nodes,
            observations,
            delay: applied,
            clamp,
        })
    }

    fn round(&self, value: f64) -> f64 {
        let factor = 10f64.powi(self.precision as i32);
        let rounded = (value * factor).round() / factor;
        // Avoid -0 keys
        if rounded == 0.0 {
            0.0
        } else {
            rounded
        }
    }
}

/// Backward-difference mass balances for every balanced metabolite at nodes `k >= 1`:
///
/// ```text
/// c[t_k, s] - c[t_(k-1), s] - h_k * sum_r S[s, r] * rate[t_k, r] = 0
/// ```
///
/// Constraint names are local to the block, `mass_balance[{t},{s}]`.
pub fn backward_difference<C, R>(
    grid: &TimeGrid,
    network: &MetabolicNetwork,
    concentration: C,
    rate: R,
) -> Result<Vec<Constraint>, AssemblyError>
where
    C: Fn(usize, &str) -> Result<Expr, AssemblyError>,
    R: Fn(usize, &str) -> Result<Expr, AssemblyError>,
{
    let (matrix, species) = network.stoichiometry_matrix()?;
    let balanced: BTreeSet<&str> = network
        .balanced_metabolites()
        .into_iter()
        .map(|m| m.id.as_str())
        .collect();

    let mut constraints = vec![];
    for k in 1..grid.nodes.len() {
        let h = grid.step(k);
        for (i, s) in species.iter().enumerate() {
            if !balanced.contains(s.as_str()) {
                continue;
            }

            let production = Expr::sum(
                network
                    .reactions
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| matrix[(i, *j)] != 0.0)
                    .map(|(j, r)| Ok(Expr::constant(matrix[(i, j)]) * rate(k, &r.id)?))
                    .collect::<Result<Vec<_>, AssemblyError>>()?,
            );

            let mut constraint = Constraint::equality(
                format!("{}[{},{}]", ConstraintGroup::MassBalance, grid.nodes[k], s),
                ConstraintGroup::MassBalance,
                concentration(k, s)? - concentration(k - 1, s)?,
                h * production,
            );
            constraint.node = Some(k);
            constraints.push(constraint);
        }
    }

    Ok(constraints)
}

/// `c[0, s] = c0[s]` for every metabolite with a declared initial value.
pub fn initial_conditions<C>(
    network: &MetabolicNetwork,
    initial: &BTreeMap<String, f64>,
    concentration: C,
) -> Result<Vec<Constraint>, AssemblyError>
where
    C: Fn(usize, &str) -> Result<Expr, AssemblyError>,
{
    let mut constraints = vec![];
    for metabolite in &network.metabolites {
        if let Some(value) = initial.get(&metabolite.id) {
            let mut constraint = Constraint::equality(
                format!("{}[{}]", ConstraintGroup::InitialCondition, metabolite.id),
                ConstraintGroup::InitialCondition,
                concentration(0, &metabolite.id)?,
                Expr::constant(*value),
            );
            constraint.node = Some(0);
            constraints.push(constraint);
        }
    }
    Ok(constraints)
}
