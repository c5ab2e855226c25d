//! Metabolic network representation.
//!
//! A [`MetabolicNetwork`] is the immutable input every kinetic model is built on. It lists
//! the metabolites, the reactions converting them and, per reaction, the reversibility bounds
//! and the catalysing enzyme (gene) identifier used to look up experiment-specific enzyme
//! levels.

use std::collections::{HashMap, HashSet};

use derive_builder::Builder;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while querying or deriving data from a metabolic network.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("Network does not contain any reactions")]
    NoReactions,
    #[error("Reaction {reaction} references undeclared species {species}")]
    UnknownSpecies { reaction: String, species: String },
    #[error("Reaction {0} is not part of the network")]
    UnknownReaction(String),
    #[error("Duplicate identifier {0}")]
    DuplicateId(String),
}

/// A metabolite (species) participating in the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Metabolite {
    #[builder(setter(into))]
    pub id: String,
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub compartment: Option<String>,
    /// External pools are not balanced by the steady-state or mass-balance constraints.
    #[builder(default)]
    #[serde(default)]
    pub boundary: bool,
}

/// A single (species, coefficient) entry on one side of a reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct ReactionElement {
    #[builder(setter(into))]
    pub species_id: String,
    #[builder(default = "1.0")]
    #[serde(default = "default_stoichiometry")]
    pub stoichiometry: f64,
}

fn default_stoichiometry() -> f64 {
    1.0
}

impl ReactionElement {
    pub fn new(species_id: impl Into<String>, stoichiometry: f64) -> Self {
        Self {
            species_id: species_id.into(),
            stoichiometry,
        }
    }
}

/// A reaction of the metabolic network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Reaction {
    #[builder(setter(into))]
    pub id: String,
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub name: Option<String>,
    #[builder(default, setter(each(name = "to_reactants")))]
    #[serde(default)]
    pub reactants: Vec<ReactionElement>,
    #[builder(default, setter(each(name = "to_products")))]
    #[serde(default)]
    pub products: Vec<ReactionElement>,
    #[builder(default = "-1000.0")]
    #[serde(default = "default_lower_bound")]
    pub lower_bound: f64,
    #[builder(default = "1000.0")]
    #[serde(default = "default_upper_bound")]
    pub upper_bound: f64,
    /// Identifier of the catalysing enzyme (singleton gene-reaction rule)
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub gene: Option<String>,
}

fn default_lower_bound() -> f64 {
    -1000.0
}

fn default_upper_bound() -> f64 {
    1000.0
}

impl Reaction {
    /// Name of the free enzyme form catalysing this reaction.
    pub fn base_enzyme(&self) -> String {
        format!("{}_ENZ", self.id)
    }

    pub fn is_reversible(&self) -> bool {
        self.lower_bound < 0.0
    }

    /// A boundary reaction has only one populated side.
    pub fn is_boundary(&self) -> bool {
        self.reactants.is_empty() || self.products.is_empty()
    }

    /// Boundary reaction draining its reactants out of the system while allowing reverse flux.
    pub fn is_efflux(&self) -> bool {
        self.products.is_empty() && self.lower_bound < 0.0
    }

    /// Signed stoichiometric coefficient of `species` in this reaction.
    pub fn coefficient(&self, species: &str) -> f64 {
        let consumed: f64 = self
            .reactants
            .iter()
            .filter(|r| r.species_id == species)
            .map(|r| r.stoichiometry)
            .sum();
        let produced: f64 = self
            .products
            .iter()
            .filter(|p| p.species_id == species)
            .map(|p| p.stoichiometry)
            .sum();
        produced - consumed
    }

    pub fn has_reactant(&self, species: &str) -> bool {
        self.reactants.iter().any(|r| r.species_id == species)
    }

    pub fn has_product(&self, species: &str) -> bool {
        self.products.iter().any(|p| p.species_id == species)
    }

    /// Iterates over all species ids on both sides, reactants first.
    pub fn participants(&self) -> impl Iterator<Item = &str> {
        self.reactants
            .iter()
            .chain(self.products.iter())
            .map(|e| e.species_id.as_str())
    }
}

/// The metabolic network: metabolites and the reactions between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetabolicNetwork {
    #[serde(default)]
    pub metabolites: Vec<Metabolite>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl MetabolicNetwork {
    /// Creates a network, checking identifiers are unique and every reaction participant
    /// is a declared metabolite.
    pub fn new(metabolites: Vec<Metabolite>, reactions: Vec<Reaction>) -> Result<Self, NetworkError> {
        let network = Self {
            metabolites,
            reactions,
        };
        network.check()?;
        Ok(network)
    }

    /// Verifies identifier uniqueness and species references.
    pub fn check(&self) -> Result<(), NetworkError> {
        let mut seen = HashSet::new();
        for id in self
            .metabolites
            .iter()
            .map(|m| &m.id)
            .chain(self.reactions.iter().map(|r| &r.id))
        {
            if !seen.insert(id.as_str()) {
                return Err(NetworkError::DuplicateId(id.clone()));
            }
        }

        for reaction in &self.reactions {
            for species in reaction.participants() {
                if self.metabolite(species).is_none() {
                    return Err(NetworkError::UnknownSpecies {
                        reaction: reaction.id.clone(),
                        species: species.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn metabolite(&self, id: &str) -> Option<&Metabolite> {
        self.metabolites.iter().find(|m| m.id == id)
    }

    pub fn reaction(&self, id: &str) -> Option<&Reaction> {
        self.reactions.iter().find(|r| r.id == id)
    }

    /// Metabolites subject to mass balance: not boundary and consumed or produced by at
    /// least one reaction.
    pub fn balanced_metabolites(&self) -> Vec<&Metabolite> {
        self.metabolites
            .iter()
            .filter(|m| !m.boundary)
            .filter(|m| {
                self.reactions
                    .iter()
                    .any(|r| r.participants().any(|s| s == m.id))
            })
            .collect()
    }

    /// Derives the stoichiometry matrix of the network.
    ///
    /// Rows follow the declaration order of the metabolites, columns the declaration order
    /// of the reactions. Reactants carry negative and products positive coefficients.
    ///
    /// # Returns
    ///
    /// * `Result<(Array2<f64>, Vec<String>), NetworkError>` - The matrix and the row species ids
    pub fn stoichiometry_matrix(&self) -> Result<(Array2<f64>, Vec<String>), NetworkError> {
        if self.reactions.is_empty() {
            return Err(NetworkError::NoReactions);
        }

        let species: Vec<String> = self.metabolites.iter().map(|m| m.id.clone()).collect();
        let species_indices: HashMap<&str, usize> = species
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let mut matrix = Array2::zeros((species.len(), self.reactions.len()));

        for (j, reaction) in self.reactions.iter().enumerate() {
            for reactant in &reaction.reactants {
                let i = species_indices
                    .get(reactant.species_id.as_str())
                    .ok_or_else(|| NetworkError::UnknownSpecies {
                        reaction: reaction.id.clone(),
                        species: reactant.species_id.clone(),
                    })?;
                matrix[(*i, j)] -= reactant.stoichiometry;
            }

            for product in &reaction.products {
                let i = species_indices
                    .get(product.species_id.as_str())
                    .ok_or_else(|| NetworkError::UnknownSpecies {
                        reaction: reaction.id.clone(),
                        species: product.species_id.clone(),
                    })?;
                matrix[(*i, j)] += product.stoichiometry;
            }
        }

        Ok((matrix, species))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    /// A + B -> C, C -> D
    fn create_test_network() -> MetabolicNetwork {
        let metabolites = ["A", "B", "C", "D"]
            .iter()
            .map(|id| MetaboliteBuilder::default().id(*id).build().unwrap())
            .collect();

        let r1 = ReactionBuilder::default()
            .id("R1")
            .to_reactants(ReactionElement::new("A", 1.0))
            .to_reactants(ReactionElement::new("B", 1.0))
            .to_products(ReactionElement::new("C", 1.0))
            .build()
            .unwrap();
        let r2 = ReactionBuilder::default()
            .id("R2")
            .to_reactants(ReactionElement::new("C", 1.0))
            .to_products(ReactionElement::new("D", 2.0))
            .build()
            .unwrap();

        MetabolicNetwork::new(metabolites, vec![r1, r2]).unwrap()
    }

    #[test]
    fn test_stoichiometry_matrix() {
        let network = create_test_network();
        let (matrix, species) = network.stoichiometry_matrix().unwrap();

        assert_eq!(species, vec!["A", "B", "C", "D"]);
        assert_eq!(
            matrix,
            arr2(&[[-1.0, 0.0], [-1.0, 0.0], [1.0, -1.0], [0.0, 2.0]])
        );
    }

    #[test]
    fn test_unknown_species() {
        let reaction = ReactionBuilder::default()
            .id("R1")
            .to_reactants(ReactionElement::new("X", 1.0))
            .build()
            .unwrap();
        let result = MetabolicNetwork::new(vec![], vec![reaction]);
        assert!(matches!(result, Err(NetworkError::UnknownSpecies { .. })));
    }

    #[test]
    fn test_coefficient_and_boundary() {
        let network = create_test_network();
        let r2 = network.reaction("R2").unwrap();
        assert_eq!(r2.coefficient("C"), -1.0);
        assert_eq!(r2.coefficient("D"), 2.0);
        assert_eq!(r2.coefficient("A"), 0.0);
        assert!(!r2.is_boundary());
        assert_eq!(r2.base_enzyme(), "R2_ENZ");
    }

    #[test]
    fn test_balanced_metabolites_skip_boundary() {
        let mut network = create_test_network();
        network.metabolites[0].boundary = true;
        let balanced: Vec<&str> = network
            .balanced_metabolites()
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(balanced, vec!["B", "C", "D"]);
    }
}
