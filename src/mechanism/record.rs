//! Compact mechanism descriptors, one per reaction.

use std::{fmt, str::FromStr};

use derive_builder::Builder;
use serde::{Deserialize, Deserializer, Serialize};

use super::error::MechanismError;

/// Binding-order family of an enzymatic mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MechanismKind {
    /// Ordered binding of all substrates, one catalytic step, ordered release of all products
    #[default]
    Sequential,
    /// Alternating bind / catalyse / release triplets, one per substrate-product pair
    PingPong,
    /// Every binding and release order is possible
    Random,
}

impl FromStr for MechanismKind {
    type Err = MechanismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" | "seq" => Ok(MechanismKind::Sequential),
            "ping-pong" | "pingpong" | "ppg" => Ok(MechanismKind::PingPong),
            "random" | "rnd" => Ok(MechanismKind::Random),
            other => Err(MechanismError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MechanismKind::Sequential => write!(f, "sequential"),
            MechanismKind::PingPong => write!(f, "ping-pong"),
            MechanismKind::Random => write!(f, "random"),
        }
    }
}

/// Rate-law family used to turn mechanisms into constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RateLawFamily {
    /// Mass-action elemental steps with forward and reverse rate constants
    #[default]
    Elemental,
    /// Reversible Michaelis-Menten with inhibition terms
    MichaelisMenten,
    /// User supplied algebraic expression per reaction
    Custom,
}

impl FromStr for RateLawFamily {
    type Err = MechanismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "elemental" => Ok(RateLawFamily::Elemental),
            "michaelis-menten" | "mm" => Ok(RateLawFamily::MichaelisMenten),
            "custom" => Ok(RateLawFamily::Custom),
            other => Err(MechanismError::UnknownFamily(other.to_string())),
        }
    }
}

impl fmt::Display for RateLawFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLawFamily::Elemental => write!(f, "elemental"),
            RateLawFamily::MichaelisMenten => write!(f, "michaelis-menten"),
            RateLawFamily::Custom => write!(f, "custom"),
        }
    }
}

/// Mechanism descriptor of a single reaction.
///
/// Ligand lists may be given either as JSON arrays or as `;`-joined strings, the format
/// used by tabular mechanism sheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct MechanismRecord {
    #[builder(setter(into))]
    pub reaction: String,
    #[builder(default)]
    #[serde(default)]
    pub kind: MechanismKind,
    /// Substrate binding order
    #[builder(default, setter(into, each(name = "to_substrates", into)))]
    #[serde(default, deserialize_with = "ligand_list")]
    pub substrates: Vec<String>,
    /// Product release order
    #[builder(default, setter(into, each(name = "to_products", into)))]
    #[serde(default, deserialize_with = "ligand_list")]
    pub products: Vec<String>,
    #[builder(default, setter(into, each(name = "to_competitive", into)))]
    #[serde(default, deserialize_with = "ligand_list")]
    pub competitive: Vec<String>,
    #[builder(default, setter(into, each(name = "to_uncompetitive", into)))]
    #[serde(default, deserialize_with = "ligand_list")]
    pub uncompetitive: Vec<String>,
    #[builder(default, setter(into, each(name = "to_noncompetitive", into)))]
    #[serde(default, deserialize_with = "ligand_list")]
    pub noncompetitive: Vec<String>,
    #[builder(default, setter(into, each(name = "to_activators", into)))]
    #[serde(default, deserialize_with = "ligand_list")]
    pub activators: Vec<String>,
    /// Expression used by the custom rate-law family
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub rate_law: Option<String>,
}

impl MechanismRecord {
    /// All modifier ligands in the order their steps are emitted.
    pub fn modifiers(&self) -> impl Iterator<Item = &String> {
        self.competitive
            .iter()
            .chain(&self.uncompetitive)
            .chain(&self.noncompetitive)
            .chain(&self.activators)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LigandList {
    List(Vec<String>),
    Joined(String),
}

fn ligand_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let ligands = match Option::<LigandList>::deserialize(deserializer)? {
        None => vec![],
        Some(LigandList::List(list)) => list,
        Some(LigandList::Joined(joined)) => joined
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    };
    Ok(ligands)
}
