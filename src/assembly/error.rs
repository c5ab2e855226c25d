use thiserror::Error;

use crate::{model::error::ModelError, network::NetworkError};

/// Errors raised while assembling the variables and constraints of an experiment block.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    #[error("Reaction {0} has a mechanism but is not part of the network")]
    UnknownReaction(String),
    #[error("Step {step} references species {species} which is not a network metabolite")]
    UnknownSpecies { step: String, species: String },
    #[error("Reaction {reaction} has no elemental steps for species {species}")]
    MissingSteps { reaction: String, species: String },
    #[error("Michaelis-Menten rate law of reaction {0} requires at least one substrate")]
    MissingSubstrates(String),
    #[error("Ligand {ligand} is not a {role} of reaction {reaction}")]
    UnknownLigand {
        reaction: String,
        ligand: String,
        role: &'static str,
    },
    #[error("Invalid rate law for reaction {reaction}: {message}")]
    InvalidRateLaw { reaction: String, message: String },
    #[error("Unknown shared parameter {0}")]
    UnknownParameter(String),
    #[error("Unknown block variable {0}")]
    UnknownVariable(String),
    #[error("Experiment {0} has no positive time horizon to discretize")]
    EmptyGrid(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Model(#[from] ModelError),
}
