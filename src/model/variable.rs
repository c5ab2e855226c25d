use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a variable in the kinetic model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    /// Elemental forward rate constant `kf`
    ForwardConstant,
    /// Elemental reverse rate constant `kr`
    ReverseConstant,
    KcatForward,
    KcatReverse,
    KmReactant,
    KmProduct,
    KmInhibitor,
    /// Custom rate-law turnover constant
    CustomKcat,
    /// Custom rate-law saturation constant
    CustomKm,
    /// Custom rate-law inhibition constant
    CustomKi,
    /// Any other custom rate-law constant
    CustomConstant,
    Concentration,
    EnzymeFraction,
    Rate,
    ForwardVelocity,
    ReverseVelocity,
    Error,
}

impl VarKind {
    /// Shared kinetic parameters, as opposed to per-experiment state.
    pub fn is_kinetic(&self) -> bool {
        !matches!(
            self,
            VarKind::Concentration
                | VarKind::EnzymeFraction
                | VarKind::Rate
                | VarKind::ForwardVelocity
                | VarKind::ReverseVelocity
                | VarKind::Error
        )
    }

    /// Short symbol used in variable keys.
    pub fn symbol(&self) -> &'static str {
        match self {
            VarKind::ForwardConstant => "kf",
            VarKind::ReverseConstant => "kr",
            VarKind::KcatForward => "Kcat_f",
            VarKind::KcatReverse => "Kcat_r",
            VarKind::KmReactant => "KM_reactants",
            VarKind::KmProduct => "KM_products",
            VarKind::KmInhibitor => "KM_inhibitors",
            VarKind::CustomKcat => "KCAT",
            VarKind::CustomKm => "KM",
            VarKind::CustomKi => "KI",
            VarKind::CustomConstant => "KCONS",
            VarKind::Concentration => "c",
            VarKind::EnzymeFraction => "e",
            VarKind::Rate => "rate",
            VarKind::ForwardVelocity => "vf",
            VarKind::ReverseVelocity => "vr",
            VarKind::Error => "error",
        }
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A decision variable of the global model.
///
/// Keys are stable strings: shared parameters are keyed `kf[R1_0]`, block variables are
/// prefixed with the experiment id (`WT.c[A]`) and time-indexed variables carry the node
/// time (`KO.rate[1.5,R1]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub kind: VarKind,
    /// Index of the owning experiment block, `None` for shared parameters
    pub block: Option<usize>,
    /// Index of the time node for dynamic blocks
    pub node: Option<usize>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub value: f64,
    /// Fixed variables keep their value during a solve
    pub fixed: bool,
}

impl Variable {
    pub fn new(key: impl Into<String>, kind: VarKind) -> Self {
        Self {
            key: key.into(),
            kind,
            block: None,
            node: None,
            lower: None,
            upper: None,
            value: 0.0,
            fixed: false,
        }
    }

    pub fn bounds(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    pub fn in_block(mut self, block: usize, node: Option<usize>) -> Self {
        self.block = Some(block);
        self.node = node;
        self
    }

    /// Fixes the variable at `value`.
    pub fn fix(&mut self, value: f64) {
        self.value = value;
        self.fixed = true;
    }

    /// Whether lower and upper bound coincide.
    pub fn is_pinned(&self) -> bool {
        matches!((self.lower, self.upper), (Some(l), Some(u)) if l == u)
    }

    /// Projects `value` onto the variable bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        let value = self.lower.map_or(value, |l| value.max(l));
        self.upper.map_or(value, |u| value.min(u))
    }

    /// Amount by which `value` lies outside the bounds.
    pub fn bound_violation(&self, value: f64) -> f64 {
        let below = self.lower.map_or(0.0, |l| (l - value).max(0.0));
        let above = self.upper.map_or(0.0, |u| (value - u).max(0.0));
        below.max(above)
    }
}
