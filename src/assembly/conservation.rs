//! Enzyme-conservation groups and per-experiment enzyme-level overrides.
//!
//! The shared [`EnzymeConservation`] table is built once from the mechanism catalog and is
//! never mutated afterwards. Experiments that perturb enzyme levels pass an immutable
//! [`EnzymeOverrides`] map to the block assembler instead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mechanism::catalog::MechanismCatalog;

/// Baseline conservation target of an unperturbed enzyme.
pub const BASELINE_TARGET: f64 = 1.0;

/// Enzyme forms of one reaction whose fractions sum to a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConservationGroup {
    pub reaction: String,
    pub members: Vec<String>,
    pub target: f64,
}

/// The shared reaction -> (enzyme forms, baseline target) table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnzymeConservation {
    groups: Vec<ConservationGroup>,
}

impl EnzymeConservation {
    /// One group per catalog reaction, every form of the reaction as a member.
    pub fn from_catalog(catalog: &MechanismCatalog) -> Self {
        let groups = catalog
            .expansions()
            .iter()
            .map(|expansion| ConservationGroup {
                reaction: expansion.reaction().to_string(),
                members: expansion.enzyme_forms(),
                target: BASELINE_TARGET,
            })
            .collect();
        Self { groups }
    }

    pub fn groups(&self) -> &[ConservationGroup] {
        &self.groups
    }

    pub fn group(&self, reaction: &str) -> Option<&ConservationGroup> {
        self.groups.iter().find(|g| g.reaction == reaction)
    }

    /// Every enzyme form of every group, in group order.
    pub fn enzyme_forms(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|g| g.members.iter().map(String::as_str))
    }

    /// Target of `reaction` with `overrides` applied.
    pub fn target(&self, reaction: &str, overrides: &EnzymeOverrides) -> Option<f64> {
        self.group(reaction)
            .map(|g| overrides.get(reaction).unwrap_or(g.target))
    }
}

/// Immutable per-experiment enzyme targets, keyed by reaction id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnzymeOverrides {
    targets: BTreeMap<String, f64>,
}

impl EnzymeOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with the target of `reaction` set to `target`.
    pub fn with(mut self, reaction: impl Into<String>, target: f64) -> Self {
        self.targets.insert(reaction.into(), target);
        self
    }

    /// Returns a copy with `reaction` knocked out.
    pub fn knockout(self, reaction: impl Into<String>) -> Self {
        self.with(reaction, 0.0)
    }

    pub fn get(&self, reaction: &str) -> Option<f64> {
        self.targets.get(reaction).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.targets.iter()
    }
}
