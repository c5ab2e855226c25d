//! Kinetic model formulation and stability analysis for metabolic networks
//!
//! This library provides functionality for:
//! - Expanding compact enzyme mechanisms into elemental steps
//! - Formulating elemental, Michaelis-Menten and custom rate laws as algebraic constraints
//! - Composing static and dynamic experiments into one global NLP
//! - Fitting the shared kinetic parameters through a pluggable solver backend
//! - Classifying the local stability of a fitted model

#![warn(unused_imports)]

/// Commonly used types and functionality re-exported for convenience
pub mod prelude {
    pub use crate::compose::*;
    pub use crate::config::*;
    pub use crate::data::*;
    pub use crate::io::*;
    pub use crate::mechanism::catalog::*;
    pub use crate::mechanism::record::*;
    pub use crate::model::global::*;
    pub use crate::network::*;
    pub use crate::report::*;
    pub use crate::solver::backend::*;
    pub use crate::stability::*;

    #[cfg(feature = "optimization")]
    pub use crate::solver::penalty::*;
}

/// Metabolites, reactions and the stoichiometry between them
pub mod network;

/// Mechanism records and their expansion into elemental steps
pub mod mechanism {
    /// Mechanism records and the reaction-indexed catalog
    pub mod catalog;
    pub mod error;
    /// Step-table construction per binding-order family
    pub mod expander;
    pub mod record;
    /// Elemental steps, step labels and enzyme-complex names
    pub mod step;
}

/// Reproducible parameter initialization
pub mod seed;

/// Variables, constraints and the global model
pub mod model {
    pub mod constraint;
    pub mod error;
    /// Expression trees with exact derivatives
    pub mod expr;
    pub mod global;
    pub mod variable;
}

/// Construction of parameters and experiment blocks
pub mod assembly {
    /// Experiment blocks
    pub mod block;
    /// Enzyme conservation groups and overrides
    pub mod conservation;
    /// Time grids and backward differences
    pub mod dynamic;
    pub mod error;
    /// Shared kinetic parameters
    pub mod parameters;
    /// Rate-law builders
    pub mod ratelaw;
}

/// Experimental data
pub mod data;

/// Run options
pub mod config;

/// Composition of experiments into the global model
pub mod compose;

/// Solver backends
pub mod solver {
    pub mod backend;
    pub mod error;
    /// Penalty-method backend using L-BFGS
    #[cfg(feature = "optimization")]
    pub mod penalty;
}

/// Local stability classification
pub mod stability;

/// Solution reports
pub mod report;

/// Consistency checks of a whole configuration
pub mod validation;

/// IO functionality
pub mod io;
