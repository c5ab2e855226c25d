use std::fmt;

use serde::{Deserialize, Serialize};

use super::expr::Expr;

/// Family a constraint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintGroup {
    /// Enzyme-form fractions of a reaction sum to the experiment target
    EnzymeConservation,
    /// Static mass balance, `S * rate = 0`
    SteadyState,
    /// Backward-difference mass balance between two time nodes
    MassBalance,
    /// `vf = kf * e * c`
    ForwardRate,
    /// `vr = kr * e * c`
    ReverseRate,
    /// `rate = vf - vr`, or `vf - vr = 0` for regulatory steps
    NetBalance,
    /// Zero net production of an intermediate enzyme form
    ComplexBalance,
    /// Michaelis-Menten or custom rate law
    RateLaw,
    InitialCondition,
    /// Definition of the block's residual error
    Error,
    /// Unit reference concentration of the basis experiment
    ReferenceConcentration,
}

impl fmt::Display for ConstraintGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintGroup::EnzymeConservation => "enz_sum",
            ConstraintGroup::SteadyState => "stoichiometry",
            ConstraintGroup::MassBalance => "mass_balance",
            ConstraintGroup::ForwardRate => "elemental_vf",
            ConstraintGroup::ReverseRate => "elemental_vr",
            ConstraintGroup::NetBalance => "es_net_balance",
            ConstraintGroup::ComplexBalance => "complex_balance",
            ConstraintGroup::RateLaw => "rate_law",
            ConstraintGroup::InitialCondition => "initial_condition",
            ConstraintGroup::Error => "compute_error",
            ConstraintGroup::ReferenceConcentration => "reference_concentration",
        };
        write!(f, "{s}")
    }
}

/// An equality constraint `body = 0`, where `body` is `lhs - rhs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub group: ConstraintGroup,
    pub block: Option<usize>,
    pub node: Option<usize>,
    pub body: Expr,
}

impl Constraint {
    /// Builds `lhs = rhs`.
    pub fn equality(name: impl Into<String>, group: ConstraintGroup, lhs: Expr, rhs: Expr) -> Self {
        Self {
            name: name.into(),
            group,
            block: None,
            node: None,
            body: lhs - rhs,
        }
    }

    pub fn in_block(mut self, block: usize, node: Option<usize>) -> Self {
        self.block = Some(block);
        self.node = node;
        self
    }

    pub fn residual(&self, x: &[f64]) -> f64 {
        self.body.eval(x)
    }
}
