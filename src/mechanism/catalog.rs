use std::collections::HashSet;

use super::{
    error::MechanismError,
    expander::{Expansion, MechanismExpander},
    record::{MechanismRecord, RateLawFamily},
    step::ElementalStep,
};

/// The expanded mechanisms of every reaction that has one, in record order.
#[derive(Debug, Clone, PartialEq)]
pub struct MechanismCatalog {
    family: RateLawFamily,
    expansions: Vec<Expansion>,
}

impl MechanismCatalog {
    /// Expands all records under the given rate-law family.
    ///
    /// # Errors
    ///
    /// Fails on the first record that cannot be expanded or when two records describe the
    /// same reaction.
    pub fn build(
        records: &[MechanismRecord],
        family: RateLawFamily,
    ) -> Result<Self, MechanismError> {
        let expander = MechanismExpander::new(family);
        let mut seen = HashSet::new();
        let mut expansions = Vec::with_capacity(records.len());

        for record in records {
            if !seen.insert(record.reaction.as_str()) {
                return Err(MechanismError::DuplicateReaction(record.reaction.clone()));
            }
            expansions.push(expander.expand(record)?);
        }

        Ok(Self { family, expansions })
    }

    pub fn family(&self) -> RateLawFamily {
        self.family
    }

    pub fn expansions(&self) -> &[Expansion] {
        &self.expansions
    }

    pub fn get(&self, reaction: &str) -> Option<&Expansion> {
        self.expansions.iter().find(|e| e.reaction() == reaction)
    }

    pub fn contains(&self, reaction: &str) -> bool {
        self.get(reaction).is_some()
    }

    /// All elemental steps of all reactions, in catalog order.
    pub fn steps(&self) -> impl Iterator<Item = &ElementalStep> {
        self.expansions.iter().flat_map(|e| e.steps().iter())
    }
}
