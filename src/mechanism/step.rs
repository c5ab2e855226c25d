//! Elemental steps, step labels and enzyme-complex names.
//!
//! Two string codecs live here and both must round-trip exactly:
//!
//! - Step labels `"{reaction}_{step}"` are split on the *final* `_`. Step ids are either a
//!   plain index (`3`) or a modifier index (`i0`) and never contain `_`, so any reaction id,
//!   including ones containing `_`, is recovered unchanged.
//! - Enzyme-complex names are the base enzyme joined with the bound ligands by `+`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::MechanismError;

/// Separator between reaction id and step id in a step label.
pub const LABEL_SEPARATOR: char = '_';

/// Separator between the base enzyme and its bound ligands.
pub const LIGAND_SEPARATOR: char = '+';

/// Role of an elemental step within its reaction's mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Binding,
    Catalytic,
    Release,
    Competitive,
    Uncompetitive,
    Noncompetitive,
    Activation,
}

impl StepKind {
    /// Regulatory steps carry no net flux; their forward and reverse velocities balance.
    pub fn is_regulatory(&self) -> bool {
        matches!(
            self,
            StepKind::Competitive
                | StepKind::Uncompetitive
                | StepKind::Noncompetitive
                | StepKind::Activation
        )
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepKind::Binding => "binding",
            StepKind::Catalytic => "catalytic",
            StepKind::Release => "release",
            StepKind::Competitive => "competitive",
            StepKind::Uncompetitive => "uncompetitive",
            StepKind::Noncompetitive => "noncompetitive",
            StepKind::Activation => "activation",
        };
        write!(f, "{s}")
    }
}

/// Identifier of a step within its reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepId {
    /// Binding, catalytic or release step, formatted as `n`
    Core(usize),
    /// Inhibition or activation step, formatted as `i{n}`
    Modifier(usize),
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepId::Core(n) => write!(f, "{n}"),
            StepId::Modifier(n) => write!(f, "i{n}"),
        }
    }
}

impl FromStr for StepId {
    type Err = MechanismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MechanismError::MalformedLabel(s.to_string());
        let (digits, modifier) = match s.strip_prefix('i') {
            Some(rest) => (rest, true),
            None => (s, false),
        };

        // Reject signs, whitespace and leading zeros so formatting reproduces the input
        if digits.is_empty()
            || !digits.bytes().all(|b| b.is_ascii_digit())
            || (digits.len() > 1 && digits.starts_with('0'))
        {
            return Err(malformed());
        }

        let n = digits.parse::<usize>().map_err(|_| malformed())?;
        Ok(if modifier {
            StepId::Modifier(n)
        } else {
            StepId::Core(n)
        })
    }
}

/// Formats the composite label of a step.
pub fn format_label(reaction: &str, step: StepId) -> String {
    format!("{reaction}{LABEL_SEPARATOR}{step}")
}

/// Splits a composite step label on its final separator.
///
/// # Errors
///
/// Returns [`MechanismError::MalformedLabel`] if the label has no separator, an empty
/// reaction part, or a step part that is not a valid step id.
pub fn parse_label(label: &str) -> Result<(String, StepId), MechanismError> {
    let (reaction, step) = label
        .rsplit_once(LABEL_SEPARATOR)
        .ok_or_else(|| MechanismError::MalformedLabel(label.to_string()))?;

    if reaction.is_empty() {
        return Err(MechanismError::MalformedLabel(label.to_string()));
    }

    let step = step
        .parse::<StepId>()
        .map_err(|_| MechanismError::MalformedLabel(label.to_string()))?;

    Ok((reaction.to_string(), step))
}

/// An enzyme form: a base enzyme with an ordered list of bound ligands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnzymeComplex {
    pub base: String,
    pub ligands: Vec<String>,
}

impl EnzymeComplex {
    /// Creates a complex, rejecting ids that would not survive a name round trip.
    pub fn new<S: AsRef<str>>(base: &str, ligands: &[S]) -> Result<Self, MechanismError> {
        check_component(base)?;
        let ligands = ligands
            .iter()
            .map(|l| {
                check_component(l.as_ref())?;
                Ok(l.as_ref().to_string())
            })
            .collect::<Result<Vec<_>, MechanismError>>()?;

        Ok(Self {
            base: base.to_string(),
            ligands,
        })
    }

    /// Canonical name, `base+l1+l2...`.
    pub fn name(&self) -> String {
        let mut name = self.base.clone();
        for ligand in &self.ligands {
            name.push(LIGAND_SEPARATOR);
            name.push_str(ligand);
        }
        name
    }

    /// Parses a complex name, verifying the parse reproduces the same name.
    pub fn parse(name: &str) -> Result<Self, MechanismError> {
        let mut parts = name.split(LIGAND_SEPARATOR);
        let base = parts
            .next()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| MechanismError::MalformedComplex(name.to_string()))?;
        let ligands: Vec<&str> = parts.collect();

        let complex = Self::new(base, &ligands)
            .map_err(|_| MechanismError::MalformedComplex(name.to_string()))?;
        if complex.name() != name {
            return Err(MechanismError::MalformedComplex(name.to_string()));
        }

        Ok(complex)
    }
}

/// Convenience wrapper building a complex name from a base and ligands.
pub fn complex_name<S: AsRef<str>>(base: &str, ligands: &[S]) -> Result<String, MechanismError> {
    Ok(EnzymeComplex::new(base, ligands)?.name())
}

fn check_component(id: &str) -> Result<(), MechanismError> {
    if id.is_empty() {
        return Err(MechanismError::InvalidIdentifier {
            id: id.to_string(),
            reason: "identifier is empty".into(),
        });
    }
    if id.contains(LIGAND_SEPARATOR) || id.chars().any(char::is_whitespace) {
        return Err(MechanismError::InvalidIdentifier {
            id: id.to_string(),
            reason: format!("identifier must not contain '{LIGAND_SEPARATOR}' or whitespace"),
        });
    }
    Ok(())
}

/// One irreducible step of a reaction mechanism.
///
/// Element 0 of both `reactants` and `products` is always an enzyme form. Element 1, when
/// present, is the metabolite bound or released by the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementalStep {
    pub reaction: String,
    pub id: StepId,
    pub kind: StepKind,
    pub reactants: Vec<String>,
    pub products: Vec<String>,
}

impl ElementalStep {
    /// Composite label `"{reaction}_{step}"`.
    pub fn label(&self) -> String {
        format_label(&self.reaction, self.id)
    }

    pub fn is_regulatory(&self) -> bool {
        self.kind.is_regulatory()
    }

    /// Enzyme form consumed by the forward direction.
    pub fn enzyme_reactant(&self) -> &str {
        &self.reactants[0]
    }

    /// Metabolite consumed by the forward direction, if any.
    pub fn ligand_reactant(&self) -> Option<&str> {
        self.reactants.get(1).map(String::as_str)
    }

    /// Enzyme form produced by the forward direction.
    pub fn enzyme_product(&self) -> &str {
        &self.products[0]
    }

    /// Metabolite produced by the forward direction, if any.
    pub fn ligand_product(&self) -> Option<&str> {
        self.products.get(1).map(String::as_str)
    }
}
